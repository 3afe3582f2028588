use std::fmt;

/// An emotion reported by the classifier.
///
/// Labels are opaque tokens compared by equality only. [`EmotionLabel::Unknown`]
/// is the sentinel for "no confident result" and never matches a real label.
///
/// ```
/// use moodplay::EmotionLabel;
///
/// assert_eq!(EmotionLabel::normalize(" HAPPY "), EmotionLabel::known("Happy"));
/// assert!(EmotionLabel::normalize("").is_unknown());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EmotionLabel {
    Known(String),
    Unknown,
}

impl EmotionLabel {
    /// Build a label from an already canonical token.
    pub fn known(label: impl Into<String>) -> Self {
        Self::Known(label.into())
    }

    /// Canonicalize a raw classifier answer: first character upper case,
    /// the rest lower case. Blank answers and `unknown` map to the sentinel.
    pub fn normalize(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.is_empty() || raw.eq_ignore_ascii_case("unknown") {
            return Self::Unknown;
        }
        let mut chars = raw.chars();
        let mut out = String::with_capacity(raw.len());
        if let Some(first) = chars.next() {
            out.extend(first.to_uppercase());
        }
        out.push_str(&chars.as_str().to_lowercase());
        Self::Known(out)
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Known(label) => label,
            Self::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for EmotionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
