use super::validation::CONCLUSION_NUMBER_LABEL;
use crate::regions::RegionLabel;
use crate::registry::RawRecord;

pub(crate) const SYSTEM_PROMPT: &str = "Ты аналитик рынка строительных подрядов. \
    Ты готовишь короткие деловые уведомления о новых заключениях экспертизы \
    для отдела продаж. Пиши по-русски, без вступлений и без Markdown.";

/// Deterministic prompt for the record. The same inputs always produce
/// the same text, the model output varies though.
pub(crate) fn render(record: &RawRecord, region: &RegionLabel, beneficiary: Option<&str>) -> String {
    let RawRecord {
        conclusion_number,
        expertise_result,
        preparer,
        developer,
        object_name,
        object_address,
        conclusion_date,
    } = record;

    let mut prompt = format!(
        "Составь уведомление о новом заключении экспертизы по данным из реестра ЕГРЗ.\n\
        \n\
        Регион: {region}\n\
        {CONCLUSION_NUMBER_LABEL} {conclusion_number}\n\
        Дата заключения: {conclusion_date}\n\
        Результат экспертизы: {expertise_result}\n\
        Наименование объекта: {object_name}\n\
        Адрес объекта: {object_address}\n\
        Застройщик, технический заказчик: {developer}\n\
        Проектировщик: {preparer}\n"
    );

    if let Some(beneficiary) = beneficiary {
        prompt.push_str(&format!(
            "\nСведения о застройщике из открытых источников:\n{beneficiary}\n"
        ));
    }

    prompt.push_str(&format!(
        "\nСтрого соблюдай формат из четырех разделов:\n\
        🏗 Объект: что строится, где и в каком регионе.\n\
        📋 Экспертиза: результат и дата заключения.\n\
        👤 Застройщик: кто заказчик, чем занимается, контакты если известны.\n\
        {CONCLUSION_NUMBER_LABEL} номер заключения без изменений.\n\
        Не выдумывай факты, которых нет в данных."
    ));

    prompt
}

/// Minimal notification used whenever the enrichment fails.
pub(crate) fn render_fallback(record: &RawRecord, region: &RegionLabel) -> String {
    let or_unknown = |value: &str| {
        if value.is_empty() {
            "не указано".to_owned()
        } else {
            value.to_owned()
        }
    };

    format!(
        "Новое заключение экспертизы\n\
        Дата заключения: {date}\n\
        Регион: {region}\n\
        {CONCLUSION_NUMBER_LABEL} {number}\n\
        Застройщик: {developer}",
        date = or_unknown(&record.conclusion_date),
        number = record.conclusion_number,
        developer = or_unknown(&record.developer),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrichment::validation::is_quality;
    use crate::testing::record;
    use expect_test::expect;

    #[test]
    fn prompt_with_beneficiary() {
        let region = RegionLabel::new("Санкт-Петербург", 78);
        let prompt = render(
            &record("X", "ООО Ромашка, ИНН 7801234567"),
            &region,
            Some("ООО Ромашка, девелопер жилой недвижимости"),
        );

        expect![[r#"
            Составь уведомление о новом заключении экспертизы по данным из реестра ЕГРЗ.

            Регион: Санкт-Петербург - 78
            Номер заключения экспертизы: X
            Дата заключения: 05.03.2024
            Результат экспертизы: Положительное заключение
            Наименование объекта: Многоквартирный жилой дом
            Адрес объекта: г. Санкт-Петербург, ул. Садовая, д. 1
            Застройщик, технический заказчик: ООО Ромашка, ИНН 7801234567
            Проектировщик: ООО Проект

            Сведения о застройщике из открытых источников:
            ООО Ромашка, девелопер жилой недвижимости

            Строго соблюдай формат из четырех разделов:
            🏗 Объект: что строится, где и в каком регионе.
            📋 Экспертиза: результат и дата заключения.
            👤 Застройщик: кто заказчик, чем занимается, контакты если известны.
            Номер заключения экспертизы: номер заключения без изменений.
            Не выдумывай факты, которых нет в данных."#]]
        .assert_eq(&prompt);
    }

    #[test]
    fn prompt_without_beneficiary_is_deterministic() {
        let region = RegionLabel::new("Москва", 77);
        let record = record("Y", "АО Лютик");

        let prompt = render(&record, &region, None);

        assert_eq!(prompt, render(&record, &region, None));
        assert!(!prompt.contains("открытых источников"));
    }

    #[test]
    fn fallback_is_never_cacheable() {
        let region = RegionLabel::new("Санкт-Петербург", 78);
        let text = render_fallback(&record("X", "ООО Ромашка"), &region);

        expect![[r#"
            Новое заключение экспертизы
            Дата заключения: 05.03.2024
            Регион: Санкт-Петербург - 78
            Номер заключения экспертизы: X
            Застройщик: ООО Ромашка"#]]
        .assert_eq(&text);

        assert!(!is_quality(&text));
    }

    #[test]
    fn fallback_with_empty_fields() {
        let region = RegionLabel::new("Москва", 77);
        let mut record = record("Z", "");
        record.conclusion_date.clear();

        let text = render_fallback(&record, &region);

        assert!(text.contains("Дата заключения: не указано"));
        assert!(text.contains("Застройщик: не указано"));
    }
}
