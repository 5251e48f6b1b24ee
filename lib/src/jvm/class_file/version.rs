use crate::jvm::{Error, Parse};
use byteorder::ReadBytesExt;

/// Version of the class file, which is used to verify that the JVM has the
/// necessary features to interpret the class
///
/// Several verification rules depend on the major version, so comparisons are derived on
/// `(major_version, minor_version)` order.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct Version {
    pub minor_version: u16,
    pub major_version: u16,
}

impl Version {
    pub const fn major(major_version: u16) -> Version {
        Version {
            minor_version: 0,
            major_version,
        }
    }

    /// Java SE 5, the last version without stack map tables
    pub const JAVA5: Version = Version::major(49);

    /// Java SE 6, where stack map tables were introduced (but the old verifier was a fallback)
    pub const JAVA6: Version = Version::major(50);

    /// Java SE 7, where stack map tables became mandatory and `jsr`/`ret` were retired
    pub const JAVA7: Version = Version::major(51);

    /// JVM class file version corresponding to Java SE 8 (released March 2014)
    pub const JAVA8: Version = Version::major(52);

    /// Java SE 11, where dynamically-computed constants were introduced
    pub const JAVA11: Version = Version::major(55);
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Version) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Version) -> std::cmp::Ordering {
        (self.major_version, self.minor_version).cmp(&(other.major_version, other.minor_version))
    }
}

impl Parse for Version {
    fn parse<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        let minor_version = u16::parse(reader)?;
        let major_version = u16::parse(reader)?;
        Ok(Version {
            minor_version,
            major_version,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn ordering_uses_major_version_first() {
        let preview = Version {
            minor_version: 0xFFFF,
            major_version: 50,
        };
        assert!(preview > Version::JAVA6);
        assert!(preview < Version::JAVA7, "minor version is less significant");
        assert!(Version::JAVA11 > Version::JAVA8);
    }
}
