use std::str::FromStr;
use validator::ValidateEmail;

#[derive(Debug, Clone)]
pub struct UserEmail(String);

impl FromStr for UserEmail {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.validate_email() {
            Ok(Self(s.to_string()))
        } else {
            Err("Invalid email.".to_string())
        }
    }
}

impl TryFrom<String> for UserEmail {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        if s.validate_email() {
            Ok(Self(s))
        } else {
            Err("Invalid email.".to_string())
        }
    }
}

impl AsRef<str> for UserEmail {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl<'de> serde::Deserialize<'de> for UserEmail {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
