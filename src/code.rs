use std::{fmt, str::FromStr};

use rand::Rng;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const SEGMENTS: [usize; 3] = [3, 4, 3];
const UUID_VERSION: usize = 7;

/// A room code as issued by [`CodeFormat::generate`]. Used verbatim as the store key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomCode(String);

impl RoomCode {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The one room-code scheme a deployment issues and accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CodeFormat {
    /// `[a-z0-9]{3}-[a-z0-9]{4}-[a-z0-9]{3}`
    #[default]
    Pattern,
    /// Lowercase hyphenated UUIDv7.
    Uuid,
}

impl CodeFormat {
    pub fn generate(&self) -> RoomCode {
        match self {
            CodeFormat::Pattern => {
                let mut rng = rand::rng();
                let segments: Vec<String> = SEGMENTS
                    .iter()
                    .map(|&len| {
                        (0..len)
                            .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
                            .collect()
                    })
                    .collect();
                RoomCode(segments.join("-"))
            }
            CodeFormat::Uuid => RoomCode(Uuid::now_v7().hyphenated().to_string()),
        }
    }

    /// Structural check only, never touches the store.
    pub fn verify(&self, candidate: &str) -> bool {
        match self {
            CodeFormat::Pattern => {
                let mut parts = candidate.split('-');
                let shaped = SEGMENTS.iter().all(|&len| {
                    parts.next().is_some_and(|part| {
                        part.len() == len
                            && part.bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
                    })
                });
                shaped && parts.next().is_none()
            }
            CodeFormat::Uuid => {
                candidate.len() == 36
                    && !candidate.bytes().any(|b| b.is_ascii_uppercase())
                    && Uuid::try_parse(candidate)
                        .is_ok_and(|uuid| uuid.get_version_num() == UUID_VERSION)
            }
        }
    }

    pub fn parse(&self, candidate: &str) -> Option<RoomCode> {
        self.verify(candidate).then(|| RoomCode(candidate.to_owned()))
    }

    /// Accepts a bare code or a URL whose last path segment is the code.
    pub fn normalize(&self, raw: &str) -> Option<RoomCode> {
        let raw = raw.trim();
        match Url::parse(raw) {
            Ok(url) => {
                let last = url.path().rsplit('/').next().unwrap_or_default();
                self.parse(last.trim())
            }
            Err(_) => self.parse(raw),
        }
    }
}

impl FromStr for CodeFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pattern" => Ok(CodeFormat::Pattern),
            "uuid" => Ok(CodeFormat::Uuid),
            other => Err(format!("unknown room code format {other:?}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_codes_verify() {
        for format in [CodeFormat::Pattern, CodeFormat::Uuid] {
            for _ in 0..256 {
                let code = format.generate();
                assert!(format.verify(code.as_str()), "{format:?} produced {code}");
            }
        }
    }

    #[test]
    fn pattern_rejects_near_misses() {
        let format = CodeFormat::Pattern;
        assert!(format.verify("ab1-cd23-ef4"));
        for bad in [
            "",
            "ab1cd23ef4",
            "ab1-cd23-ef",
            "ab1-cd234-ef4",
            "AB1-cd23-ef4",
            "ab1-cd23-ef4-",
            "ab1-cd_3-ef4",
            " ab1-cd23-ef4",
            "ab1-cd23-éf4",
        ] {
            assert!(!format.verify(bad), "accepted {bad:?}");
        }
    }

    #[test]
    fn uuid_format_is_version_pinned() {
        let format = CodeFormat::Uuid;
        let v4 = "9b2f6c0e-3c8a-4b5e-9f1d-2a7c3e4b5d6f";
        assert!(!format.verify(v4));
        let v7 = Uuid::now_v7().hyphenated().to_string();
        assert!(format.verify(&v7));
        assert!(!format.verify(&v7.to_uppercase()));
        assert!(!format.verify(&Uuid::now_v7().simple().to_string()));
        assert!(!CodeFormat::Pattern.verify(&v7));
    }

    #[test]
    fn normalize_takes_the_last_path_segment() {
        let format = CodeFormat::Pattern;
        let expected = format.parse("ab1-cd23-ef4");
        assert!(expected.is_some());
        assert_eq!(format.normalize("http://host/ab1-cd23-ef4"), expected);
        assert_eq!(format.normalize("  https://host/rooms/ab1-cd23-ef4?x=1 "), expected);
        assert_eq!(format.normalize("ab1-cd23-ef4"), expected);
        assert_eq!(format.normalize("http://host/ab1-cd23-ef4/"), None);
        assert_eq!(format.normalize("http://host/"), None);
    }

    #[test]
    fn format_names_parse() {
        assert_eq!("pattern".parse::<CodeFormat>(), Ok(CodeFormat::Pattern));
        assert_eq!(" UUID ".parse::<CodeFormat>(), Ok(CodeFormat::Uuid));
        assert!("nanoid".parse::<CodeFormat>().is_err());
    }
}
