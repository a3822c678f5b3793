use easy_ext::ext;

pub(crate) mod prelude {
    pub(crate) use super::ErrorExt as _;
    pub(crate) use super::StrExt as _;
}

#[ext(ErrorExt)]
pub(crate) impl<E> E
where
    E: std::error::Error + ?Sized,
{
    fn display_chain(&self) -> display_error_chain::DisplayErrorChain<&Self> {
        display_error_chain::DisplayErrorChain::new(self)
    }
}

#[ext(StrExt)]
pub(crate) impl str {
    /// Cuts the string to at most `max_chars` characters (not bytes).
    fn truncate_chars(&self, max_chars: usize) -> &str {
        match self.char_indices().nth(max_chars) {
            Some((byte_idx, _)) => &self[..byte_idx],
            None => self,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_chars_counts_characters() {
        assert_eq!("Застройщик".truncate_chars(4), "Заст");
        assert_eq!("abc".truncate_chars(10), "abc");
        assert_eq!("abc".truncate_chars(0), "");
    }
}
