//! Closed vocabularies for providers, regions and host tags.
//!
//! Variant strings match the values stored in the database and accepted
//! on the wire.

/// Returned when a string is not a member of a closed vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} '{value}'")]
pub struct UnknownTag {
    pub kind: &'static str,
    pub value: String,
}

define_tag_enum! {
    /// Cloud provider a blueprint targets.
    Provider("provider") {
        Aws = "aws",
        Azure = "azure",
    }
}

define_tag_enum! {
    /// Deployment region.
    Region("region") {
        UsEast1 = "us-east-1",
        UsEast2 = "us-east-2",
        UsWest1 = "us-west-1",
        UsWest2 = "us-west-2",
        EuWest1 = "eu-west-1",
        EuCentral1 = "eu-central-1",
    }
}

define_tag_enum! {
    /// Operating system image for a host.
    OsTag("os") {
        Debian11 = "debian_11",
        Debian12 = "debian_12",
        Ubuntu20 = "ubuntu_20",
        Ubuntu22 = "ubuntu_22",
        Ubuntu24 = "ubuntu_24",
        Suse12 = "suse_12",
        Suse15 = "suse_15",
        Kali = "kali",
        Windows2016 = "windows_2016",
        Windows2019 = "windows_2019",
        Windows2022 = "windows_2022",
    }
}

define_tag_enum! {
    /// Instance size class for a host.
    SizeTag("size") {
        Small = "small",
        Medium = "medium",
        Large = "large",
        XLarge = "xlarge",
    }
}

/// Largest disk a single host may request, in GiB.
pub const MAX_DISK_GIB: u32 = 65_536;

impl OsTag {
    /// Smallest root disk the image boots from, in GiB.
    pub fn min_disk_gib(self) -> u32 {
        match self {
            OsTag::Windows2016 | OsTag::Windows2019 | OsTag::Windows2022 => 32,
            _ => 8,
        }
    }
}

/// Render the allowed values of a vocabulary as `a, b, c`.
pub fn allowed_values<T: std::fmt::Display>(all: &[T]) -> String {
    all.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_round_trips_through_str() {
        for region in Region::ALL {
            assert_eq!(region.as_str().parse::<Region>().unwrap(), *region);
        }
    }

    #[test]
    fn unknown_region_names_the_vocabulary() {
        let err = "mars-north-1".parse::<Region>().unwrap_err();
        assert_eq!(err.kind, "region");
        assert_eq!(err.to_string(), "unknown region 'mars-north-1'");
    }

    #[test]
    fn windows_images_need_larger_disks() {
        assert_eq!(OsTag::Windows2022.min_disk_gib(), 32);
        assert_eq!(OsTag::Debian12.min_disk_gib(), 8);
        assert_eq!(OsTag::Kali.min_disk_gib(), 8);
    }

    #[test]
    fn provider_serializes_as_lowercase_string() {
        assert_eq!(serde_json::to_string(&Provider::Aws).unwrap(), "\"aws\"");
        let p: Provider = serde_json::from_str("\"azure\"").unwrap();
        assert_eq!(p, Provider::Azure);
    }

    #[test]
    fn allowed_values_lists_every_size() {
        assert_eq!(allowed_values(SizeTag::ALL), "small, medium, large, xlarge");
    }
}
