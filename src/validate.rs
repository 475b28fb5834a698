use crate::config::{ConfigError, ValidationConfig};
use regex::Regex;
use std::sync::LazyLock;

static DEFAULT_VALIDATOR: LazyLock<PlateValidator> = LazyLock::new(PlateValidator::default);

/// Plausibility rules for a plate reading.
///
/// Real plates mix letters and digits; strings of only digits or only
/// capital letters are nearly always OCR picking up unrelated text.
#[derive(Debug, Clone)]
pub struct PlateValidator {
    min_length: usize,
    max_length: usize,
    digits_only: Regex,
    letters_only: Regex,
    allowed: Option<Regex>,
}

impl PlateValidator {
    pub fn new(config: &ValidationConfig) -> Result<Self, ConfigError> {
        let allowed = match config.allowed_characters.as_deref() {
            Some(class) => Some(Regex::new(&format!("^[{}]+$", class))?),
            None => None,
        };
        Ok(Self {
            min_length: config.min_length,
            max_length: config.max_length,
            digits_only: Regex::new("^[0-9]+$")?,
            letters_only: Regex::new("^[A-Z]+$")?,
            allowed,
        })
    }

    pub fn is_valid(&self, text: &str) -> bool {
        let len = text.chars().count();
        if len < self.min_length || len > self.max_length {
            return false;
        }
        if self.digits_only.is_match(text) || self.letters_only.is_match(text) {
            return false;
        }
        self.allowed.as_ref().is_none_or(|re| re.is_match(text))
    }
}

impl Default for PlateValidator {
    fn default() -> Self {
        Self::new(&ValidationConfig::default())
            .expect("default validation config has no custom pattern")
    }
}

/// Default rules: 3 to 9 characters, not all digits, not all capitals.
pub fn is_valid_plate(text: &str) -> bool {
    DEFAULT_VALIDATOR.is_valid(text)
}
