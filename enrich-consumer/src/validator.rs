use std::fmt;
use std::str::FromStr;

use enrich_common::record::RawRecord;
use regex::Regex;

use crate::error::ValidationError;

/// The script names must be written in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Alphabet {
    /// Russian letters А-Я and а-я. Ё is outside both ranges.
    #[default]
    Cyrillic,
    Latin,
}

impl Alphabet {
    fn pattern(&self) -> &'static str {
        match self {
            Alphabet::Cyrillic => "^[А-Я][а-яА-Я]*$",
            Alphabet::Latin => "^[A-Z][a-zA-Z]*$",
        }
    }
}

impl fmt::Display for Alphabet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Alphabet::Cyrillic => f.write_str("cyrillic"),
            Alphabet::Latin => f.write_str("latin"),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct ParseAlphabetError(pub String);

impl FromStr for Alphabet {
    type Err = ParseAlphabetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cyrillic" => Ok(Alphabet::Cyrillic),
            "latin" => Ok(Alphabet::Latin),
            other => Err(ParseAlphabetError(other.to_owned())),
        }
    }
}

/// Gatekeeper for the enrichment path. Pure and deterministic.
#[derive(Debug, Clone)]
pub struct Validator {
    alphabet: Alphabet,
    name_pattern: Regex,
}

impl Validator {
    pub fn new(alphabet: Alphabet) -> Result<Self, regex::Error> {
        Ok(Self {
            alphabet,
            name_pattern: Regex::new(alphabet.pattern())?,
        })
    }

    pub fn alphabet(&self) -> Alphabet {
        self.alphabet
    }

    /// Name and surname must be present, then each must be one capital letter of the
    /// alphabet followed by letters of the same alphabet. Patronymic is not checked.
    pub fn validate(&self, record: RawRecord) -> Result<RawRecord, ValidationError> {
        if record.name.is_empty() || record.surname.is_empty() {
            return Err(ValidationError::MissingField);
        }

        if !self.name_pattern.is_match(&record.name) || !self.name_pattern.is_match(&record.surname)
        {
            return Err(ValidationError::InvalidScript(self.alphabet));
        }

        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, surname: &str) -> RawRecord {
        RawRecord {
            name: name.to_owned(),
            surname: surname.to_owned(),
            ..Default::default()
        }
    }

    #[test]
    fn accepts_capitalized_cyrillic_names() {
        let validator = Validator::new(Alphabet::Cyrillic).unwrap();

        let input = RawRecord {
            patronymic: "whatever 123".to_owned(),
            ..record("Иван", "Петров")
        };
        assert_eq!(validator.validate(input.clone()), Ok(input));
        assert!(validator.validate(record("Я", "ПЕТРОВ")).is_ok());
    }

    #[test]
    fn missing_fields_come_first() {
        let validator = Validator::new(Alphabet::Cyrillic).unwrap();

        for (name, surname) in [("", "Петров"), ("Иван", ""), ("", ""), ("", "petrov")] {
            assert_eq!(
                validator.validate(record(name, surname)),
                Err(ValidationError::MissingField)
            );
        }
    }

    #[test]
    fn rejects_wrong_case_or_script() {
        let validator = Validator::new(Alphabet::Cyrillic).unwrap();

        for (name, surname) in [
            ("ivan", "Petrov"),
            ("Ivan", "Petrov"),
            ("иван", "Петров"),
            ("Иван", "петров"),
            ("Иван-Мария", "Петров"),
            ("Иван ", "Петров"),
            ("Иван1", "Петров"),
            ("Ёжиков", "Петров"),
        ] {
            assert_eq!(
                validator.validate(record(name, surname)),
                Err(ValidationError::InvalidScript(Alphabet::Cyrillic)),
                "{name} {surname}"
            );
        }
    }

    #[test]
    fn latin_alphabet() {
        let validator = Validator::new(Alphabet::Latin).unwrap();

        assert!(validator.validate(record("Ivan", "Petrov")).is_ok());
        assert_eq!(
            validator.validate(record("Иван", "Петров")),
            Err(ValidationError::InvalidScript(Alphabet::Latin))
        );
    }

    #[test]
    fn parse_alphabet() {
        assert_eq!("Cyrillic".parse::<Alphabet>(), Ok(Alphabet::Cyrillic));
        assert_eq!(" latin ".parse::<Alphabet>(), Ok(Alphabet::Latin));
        assert_eq!(
            "greek".parse::<Alphabet>(),
            Err(ParseAlphabetError("greek".to_owned()))
        );
    }
}
