use crate::Compression;
use crate::error::{Error, ErrorKind};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

impl Compression {
    /// The canonical wire name, as carried in record formats, policy targets
    /// and the `Supported-Compression` negotiation header.
    #[must_use]
    pub fn wire_name(&self) -> &'static str {
        match self {
            Compression::None => "none",
            Compression::Gzip => "gzip",
            Compression::Bzip2 => "bz2",
            Compression::Lzma => "lzma",
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

impl FromStr for Compression {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(Compression::None),
            "gz" | "gzip" => Ok(Compression::Gzip),
            "bz2" | "bzip2" => Ok(Compression::Bzip2),
            "xz" | "lzma" => Ok(Compression::Lzma),
            _ => exn::bail!(ErrorKind::UnsupportedFormat(s.to_string())),
        }
    }
}

// On the wire a compression algorithm is always its canonical name; absence
// of compression is a `null`, handled by `Option` at the field level.
impl Serialize for Compression {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.wire_name())
    }
}

impl<'de> Deserialize<'de> for Compression {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(|_| serde::de::Error::custom(format!("unsupported compression format: {name}")))
    }
}

#[cfg(test)]
mod tests {
    use crate::Compression;
    use rstest::rstest;

    #[rstest]
    #[case("none", Compression::None)]
    #[case("gz", Compression::Gzip)]
    #[case("gzip", Compression::Gzip)]
    #[case("GZIP", Compression::Gzip)]
    #[case("bz2", Compression::Bzip2)]
    #[case("bzip2", Compression::Bzip2)]
    #[case("xz", Compression::Lzma)]
    #[case("lzma", Compression::Lzma)]
    fn test_from_str(#[case] test: &str, #[case] expected: Compression) {
        assert_eq!(test.parse::<Compression>().unwrap(), expected);
    }

    #[rstest]
    #[case("invalid")]
    #[case("definitely not valid")]
    #[case(" ")]
    fn test_from_str_invalid(#[case] test: &str) {
        assert!(test.parse::<Compression>().is_err());
    }

    #[rstest]
    #[case(Compression::Gzip, "gzip")]
    #[case(Compression::Bzip2, "bz2")]
    #[case(Compression::Lzma, "lzma")]
    fn test_wire_name_round_trip(#[case] format: Compression, #[case] name: &str) {
        assert_eq!(format.wire_name(), name);
        assert_eq!(name.parse::<Compression>().unwrap(), format);
    }

    #[test]
    fn test_serde_round_trip() {
        let json = serde_json::to_string(&Compression::Bzip2).unwrap();
        assert_eq!(json, "\"bz2\"");
        assert_eq!(serde_json::from_str::<Compression>(&json).unwrap(), Compression::Bzip2);
        // Absence is a null at the field level
        assert_eq!(serde_json::from_str::<Option<Compression>>("null").unwrap(), None);
    }
}
