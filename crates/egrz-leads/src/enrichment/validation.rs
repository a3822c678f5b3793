//! Quality check of the LLM output. Only texts that pass it are cached.

pub(crate) const CONCLUSION_NUMBER_LABEL: &str = "Номер заключения экспертизы:";

/// Section markers every notification must contain
pub(crate) const SECTION_MARKERS: &[&str] = &["🏗", "📋", "👤", CONCLUSION_NUMBER_LABEL];

const MIN_CHARS: usize = 50;

/// Refusals and apologies that leak from the model instead of a notification
const DENYLIST: &[&str] = &[
    "извините",
    "я не могу",
    "не могу помочь",
    "к сожалению, я",
    "as an ai",
    "i'm sorry",
    "i cannot",
    "i can't",
];

pub(crate) fn is_quality(text: &str) -> bool {
    if text.chars().count() < MIN_CHARS {
        return false;
    }

    if !SECTION_MARKERS.iter().all(|marker| text.contains(marker)) {
        return false;
    }

    let lowercase = text.to_lowercase();
    !DENYLIST.iter().any(|phrase| lowercase.contains(phrase))
}
