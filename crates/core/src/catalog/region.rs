use serde::{Deserialize, Serialize};
use std::fmt;

/// Hosting region of the catalog API.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Region {
    #[default]
    Na,
    Eu,
    Apac,
    Ca,
    Cn,
}

impl Region {
    /// Regional API gateway.
    pub fn base_url(&self) -> &'static str {
        match self {
            Region::Na => "https://api-na.hosted.exlibrisgroup.com",
            Region::Eu => "https://api-eu.hosted.exlibrisgroup.com",
            Region::Apac => "https://api-ap.hosted.exlibrisgroup.com",
            Region::Ca => "https://api-ca.hosted.exlibrisgroup.com",
            Region::Cn => "https://api-cn.hosted.exlibrisgroup.com.cn",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Region::Na => "NA",
            Region::Eu => "EU",
            Region::Apac => "APAC",
            Region::Ca => "CA",
            Region::Cn => "CN",
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_serde() {
        assert_eq!(serde_json::to_string(&Region::Apac).unwrap(), "\"APAC\"");
        let region: Region = serde_json::from_str("\"EU\"").unwrap();
        assert_eq!(region, Region::Eu);
        assert!(serde_json::from_str::<Region>("\"eu\"").is_err());
    }

    #[test]
    fn test_default_region_is_north_america() {
        assert_eq!(Region::default(), Region::Na);
        assert_eq!(
            Region::default().base_url(),
            "https://api-na.hosted.exlibrisgroup.com"
        );
    }
}
