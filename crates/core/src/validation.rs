//! Blueprint tree validator. Pure logic, no I/O.
//!
//! The same checks run when a blueprint is created and again immediately
//! before a deploy job provisions it. Every violation found is reported in
//! a single pass so client tooling can show all of them at once.

use std::collections::HashSet;
use std::fmt;
use std::sync::LazyLock;

use ipnetwork::Ipv4Network;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::blueprint::{CreateBlueprint, HostTemplate, SubnetTemplate, VpcTemplate};
use crate::tags::{allowed_values, OsTag, SizeTag, MAX_DISK_GIB};

/// Maximum length of blueprint and range names.
pub const MAX_NAME_LEN: usize = 64;

/// RFC 1123 hostname label.
static HOSTNAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]([a-z0-9-]{0,61}[a-z0-9])?$").expect("valid regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationCode {
    Required,
    TooLong,
    InvalidCharacter,
    MissingChildren,
    InvalidCidr,
    NonCanonicalCidr,
    SubnetOutsideVpc,
    SubnetOverlap,
    VpcOverlap,
    DuplicateName,
    InvalidHostname,
    UnknownOs,
    UnknownSize,
    DiskTooSmall,
    DiskTooLarge,
}

/// One broken invariant, located by a path such as `vpcs[0].subnets[1].cidr`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub path: String,
    pub code: ViolationCode,
    pub message: String,
}

/// Every violation found in one validation pass. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidationErrors(Vec<Violation>);

impl ValidationErrors {
    pub fn violations(&self) -> &[Violation] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> Vec<Violation> {
        self.0
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, v) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}: {}", v.path, v.message)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

#[derive(Default)]
struct Checker {
    violations: Vec<Violation>,
}

impl Checker {
    fn push(&mut self, path: impl Into<String>, code: ViolationCode, message: impl Into<String>) {
        self.violations.push(Violation {
            path: path.into(),
            code,
            message: message.into(),
        });
    }

    fn finish(self) -> Result<(), ValidationErrors> {
        if self.violations.is_empty() {
            Ok(())
        } else {
            Err(ValidationErrors(self.violations))
        }
    }

    fn name(&mut self, path: &str, what: &str, value: &str) {
        let value = value.trim();
        if value.is_empty() {
            self.push(path, ViolationCode::Required, format!("{what} must not be empty"));
        } else if value.len() > MAX_NAME_LEN {
            self.push(
                path,
                ViolationCode::TooLong,
                format!("{what} must not exceed {MAX_NAME_LEN} characters"),
            );
        }
    }

    /// Report every name that appears more than once among siblings.
    fn unique<'a>(
        &mut self,
        names: impl Iterator<Item = (String, &'a str)>,
        what: &str,
        scope: &str,
    ) {
        let mut seen = HashSet::new();
        for (path, name) in names {
            let name = name.trim();
            if name.is_empty() {
                continue;
            }
            if !seen.insert(name) {
                self.push(
                    path,
                    ViolationCode::DuplicateName,
                    format!("{what} '{name}' is used more than once in {scope}"),
                );
            }
        }
    }

    fn cidr(&mut self, path: &str, owner: &str, raw: &str) -> Option<Ipv4Network> {
        match parse_cidr(raw) {
            Ok(net) => Some(net),
            Err((code, reason)) => {
                self.push(path, code, format!("{owner}: {reason}"));
                None
            }
        }
    }
}

/// Parse a canonical IPv4 CIDR block (`a.b.c.d/n`, no host bits set).
pub fn parse_cidr(raw: &str) -> Result<Ipv4Network, (ViolationCode, String)> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err((ViolationCode::Required, "CIDR block must not be empty".into()));
    }
    if !raw.contains('/') {
        return Err((
            ViolationCode::InvalidCidr,
            format!("'{raw}' is not a CIDR block (expected a.b.c.d/n)"),
        ));
    }
    let net: Ipv4Network = raw.parse().map_err(|e| {
        (
            ViolationCode::InvalidCidr,
            format!("'{raw}' is not a valid IPv4 CIDR block: {e}"),
        )
    })?;
    if net.ip() != net.network() {
        return Err((
            ViolationCode::NonCanonicalCidr,
            format!(
                "'{raw}' has host bits set (did you mean {}/{}?)",
                net.network(),
                net.prefix()
            ),
        ));
    }
    Ok(net)
}

/// `inner` lies entirely within `outer`.
pub fn cidr_contains(outer: Ipv4Network, inner: Ipv4Network) -> bool {
    outer.prefix() <= inner.prefix() && outer.contains(inner.network())
}

/// The two blocks share at least one address.
pub fn cidr_overlaps(a: Ipv4Network, b: Ipv4Network) -> bool {
    a.contains(b.network()) || b.contains(a.network())
}

/// Validate a full blueprint create request.
pub fn validate_blueprint(input: &CreateBlueprint) -> Result<(), ValidationErrors> {
    let mut checker = Checker::default();
    checker.name("name", "Blueprint name", &input.name);
    check_vpcs(&mut checker, &input.vpcs);
    checker.finish()
}

/// Validate a VPC/Subnet/Host tree on its own.
///
/// This is the check a deploy job re-runs before provisioning.
pub fn validate_vpcs(vpcs: &[VpcTemplate]) -> Result<(), ValidationErrors> {
    let mut checker = Checker::default();
    check_vpcs(&mut checker, vpcs);
    checker.finish()
}

/// Validate the name a range will be deployed under.
pub fn validate_range_name(name: &str) -> Result<(), ValidationErrors> {
    let mut checker = Checker::default();
    checker.name("name", "Range name", name);
    if name.contains('/') {
        checker.push(
            "name",
            ViolationCode::InvalidCharacter,
            "Range name must not contain '/'",
        );
    }
    checker.finish()
}

fn check_vpcs(checker: &mut Checker, vpcs: &[VpcTemplate]) {
    if vpcs.is_empty() {
        checker.push(
            "vpcs",
            ViolationCode::MissingChildren,
            "A blueprint must define at least one VPC",
        );
        return;
    }

    checker.unique(
        vpcs.iter()
            .enumerate()
            .map(|(i, v)| (format!("vpcs[{i}].name"), v.name.as_str())),
        "VPC name",
        "the blueprint",
    );

    let mut parsed: Vec<(usize, &VpcTemplate, Ipv4Network)> = Vec::new();
    for (i, vpc) in vpcs.iter().enumerate() {
        let path = format!("vpcs[{i}]");
        checker.name(&format!("{path}.name"), "VPC name", &vpc.name);
        let net = checker.cidr(&format!("{path}.cidr"), &format!("VPC '{}'", vpc.name), &vpc.cidr);
        if let Some(net) = net {
            parsed.push((i, vpc, net));
        }
        check_subnets(checker, &path, vpc, net);
    }

    for (a_idx, (_, a_vpc, a_net)) in parsed.iter().enumerate() {
        for (b_i, b_vpc, b_net) in &parsed[a_idx + 1..] {
            if cidr_overlaps(*a_net, *b_net) {
                checker.push(
                    format!("vpcs[{b_i}].cidr"),
                    ViolationCode::VpcOverlap,
                    format!(
                        "VPC '{}' ({b_net}) overlaps VPC '{}' ({a_net})",
                        b_vpc.name, a_vpc.name
                    ),
                );
            }
        }
    }
}

fn check_subnets(
    checker: &mut Checker,
    vpc_path: &str,
    vpc: &VpcTemplate,
    vpc_net: Option<Ipv4Network>,
) {
    if vpc.subnets.is_empty() {
        checker.push(
            format!("{vpc_path}.subnets"),
            ViolationCode::MissingChildren,
            format!("VPC '{}' must define at least one subnet", vpc.name),
        );
        return;
    }

    checker.unique(
        vpc.subnets
            .iter()
            .enumerate()
            .map(|(j, s)| (format!("{vpc_path}.subnets[{j}].name"), s.name.as_str())),
        "Subnet name",
        &format!("VPC '{}'", vpc.name),
    );

    let mut parsed: Vec<(usize, &SubnetTemplate, Ipv4Network)> = Vec::new();
    for (j, subnet) in vpc.subnets.iter().enumerate() {
        let path = format!("{vpc_path}.subnets[{j}]");
        checker.name(&format!("{path}.name"), "Subnet name", &subnet.name);
        let cidr_path = format!("{path}.cidr");
        let net = checker.cidr(&cidr_path, &format!("Subnet '{}'", subnet.name), &subnet.cidr);

        if let (Some(outer), Some(inner)) = (vpc_net, net) {
            if !cidr_contains(outer, inner) {
                checker.push(
                    cidr_path.clone(),
                    ViolationCode::SubnetOutsideVpc,
                    format!(
                        "Subnet '{}' ({inner}) is not contained in VPC '{}' ({outer})",
                        subnet.name, vpc.name
                    ),
                );
            }
        }
        if let Some(net) = net {
            parsed.push((j, subnet, net));
        }

        check_hosts(checker, &path, subnet);
    }

    for (a_idx, (_, a_sub, a_net)) in parsed.iter().enumerate() {
        for (b_j, b_sub, b_net) in &parsed[a_idx + 1..] {
            if cidr_overlaps(*a_net, *b_net) {
                checker.push(
                    format!("{vpc_path}.subnets[{b_j}].cidr"),
                    ViolationCode::SubnetOverlap,
                    format!(
                        "Subnet '{}' ({b_net}) overlaps subnet '{}' ({a_net})",
                        b_sub.name, a_sub.name
                    ),
                );
            }
        }
    }
}

fn check_hosts(checker: &mut Checker, subnet_path: &str, subnet: &SubnetTemplate) {
    checker.unique(
        subnet
            .hosts
            .iter()
            .enumerate()
            .map(|(k, h)| (format!("{subnet_path}.hosts[{k}].hostname"), h.hostname.as_str())),
        "Hostname",
        &format!("subnet '{}'", subnet.name),
    );

    for (k, host) in subnet.hosts.iter().enumerate() {
        check_host(checker, &format!("{subnet_path}.hosts[{k}]"), host);
    }
}

fn check_host(checker: &mut Checker, path: &str, host: &HostTemplate) {
    let hostname = host.hostname.trim();
    if hostname.is_empty() {
        checker.push(
            format!("{path}.hostname"),
            ViolationCode::Required,
            "Hostname must not be empty",
        );
    } else if !HOSTNAME_RE.is_match(hostname) {
        checker.push(
            format!("{path}.hostname"),
            ViolationCode::InvalidHostname,
            format!(
                "Hostname '{hostname}' must be 1-63 lowercase letters, digits or hyphens \
                 and may not start or end with a hyphen"
            ),
        );
    }

    let os = match host.os.parse::<OsTag>() {
        Ok(os) => Some(os),
        Err(_) => {
            checker.push(
                format!("{path}.os"),
                ViolationCode::UnknownOs,
                format!(
                    "Host '{hostname}' has unknown OS '{}' (allowed: {})",
                    host.os,
                    allowed_values(OsTag::ALL)
                ),
            );
            None
        }
    };

    if host.size.parse::<SizeTag>().is_err() {
        checker.push(
            format!("{path}.size"),
            ViolationCode::UnknownSize,
            format!(
                "Host '{hostname}' has unknown size '{}' (allowed: {})",
                host.size,
                allowed_values(SizeTag::ALL)
            ),
        );
    }

    if let Some(os) = os {
        if host.disk_gib < os.min_disk_gib() {
            checker.push(
                format!("{path}.disk_gib"),
                ViolationCode::DiskTooSmall,
                format!(
                    "Host '{hostname}' needs at least {} GiB of disk for {os}",
                    os.min_disk_gib()
                ),
            );
        }
    }
    if host.disk_gib > MAX_DISK_GIB {
        checker.push(
            format!("{path}.disk_gib"),
            ViolationCode::DiskTooLarge,
            format!("Host '{hostname}' disk must not exceed {MAX_DISK_GIB} GiB"),
        );
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::blueprint::BlueprintFeatures;
    use crate::tags::Provider;

    fn host(name: &str) -> HostTemplate {
        HostTemplate {
            hostname: name.into(),
            os: "debian_12".into(),
            size: "small".into(),
            disk_gib: 16,
            tags: vec!["web".into()],
        }
    }

    fn subnet(name: &str, cidr: &str, hosts: Vec<HostTemplate>) -> SubnetTemplate {
        SubnetTemplate {
            name: name.into(),
            cidr: cidr.into(),
            hosts,
        }
    }

    fn vpc(name: &str, cidr: &str, subnets: Vec<SubnetTemplate>) -> VpcTemplate {
        VpcTemplate {
            name: name.into(),
            cidr: cidr.into(),
            subnets,
        }
    }

    fn blueprint(vpcs: Vec<VpcTemplate>) -> CreateBlueprint {
        CreateBlueprint {
            name: "lab".into(),
            description: None,
            provider: Provider::Aws,
            features: BlueprintFeatures::default(),
            vpcs,
        }
    }

    fn codes(err: &ValidationErrors) -> Vec<ViolationCode> {
        err.violations().iter().map(|v| v.code).collect()
    }

    #[test]
    fn single_vpc_single_subnet_is_valid() {
        let bp = blueprint(vec![vpc(
            "main",
            "10.0.0.0/16",
            vec![subnet("dmz", "10.0.1.0/24", vec![host("web")])],
        )]);
        assert!(validate_blueprint(&bp).is_ok());
    }

    #[test]
    fn subnet_outside_vpc_is_reported_against_that_subnet() {
        let vpcs = vec![vpc(
            "main",
            "10.0.0.0/16",
            vec![
                subnet("ok", "10.0.1.0/24", vec![]),
                subnet("stray", "192.168.1.0/24", vec![]),
            ],
        )];
        let err = validate_vpcs(&vpcs).unwrap_err();
        assert_eq!(err.len(), 1);
        let v = &err.violations()[0];
        assert_eq!(v.code, ViolationCode::SubnetOutsideVpc);
        assert_eq!(v.path, "vpcs[0].subnets[1].cidr");
        assert!(v.message.contains("stray"));
    }

    #[test]
    fn subnet_larger_than_vpc_is_not_contained() {
        let vpcs = vec![vpc(
            "main",
            "10.0.0.0/24",
            vec![subnet("wide", "10.0.0.0/16", vec![])],
        )];
        let err = validate_vpcs(&vpcs).unwrap_err();
        assert_eq!(codes(&err), vec![ViolationCode::SubnetOutsideVpc]);
    }

    #[test]
    fn sibling_subnets_may_not_overlap() {
        let vpcs = vec![vpc(
            "main",
            "10.0.0.0/16",
            vec![
                subnet("a", "10.0.0.0/23", vec![]),
                subnet("b", "10.0.1.0/24", vec![]),
                subnet("c", "10.0.4.0/24", vec![]),
            ],
        )];
        let err = validate_vpcs(&vpcs).unwrap_err();
        assert_eq!(codes(&err), vec![ViolationCode::SubnetOverlap]);
        assert_eq!(err.violations()[0].path, "vpcs[0].subnets[1].cidr");
    }

    #[test]
    fn vpcs_may_not_overlap() {
        let vpcs = vec![
            vpc("a", "10.0.0.0/16", vec![subnet("s", "10.0.1.0/24", vec![])]),
            vpc("b", "10.0.0.0/8", vec![subnet("s", "10.1.0.0/24", vec![])]),
        ];
        let err = validate_vpcs(&vpcs).unwrap_err();
        assert_eq!(codes(&err), vec![ViolationCode::VpcOverlap]);
    }

    #[test]
    fn names_must_be_unique_among_siblings() {
        let vpcs = vec![
            vpc(
                "main",
                "10.0.0.0/16",
                vec![
                    subnet("dup", "10.0.1.0/24", vec![host("web"), host("web")]),
                    subnet("dup", "10.0.2.0/24", vec![host("web")]),
                ],
            ),
            vpc("main", "10.1.0.0/16", vec![subnet("dup", "10.1.1.0/24", vec![])]),
        ];
        let err = validate_vpcs(&vpcs).unwrap_err();
        let paths: Vec<&str> = err.violations().iter().map(|v| v.path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "vpcs[1].name",
                "vpcs[0].subnets[1].name",
                "vpcs[0].subnets[0].hosts[1].hostname",
            ]
        );
        assert!(codes(&err).iter().all(|c| *c == ViolationCode::DuplicateName));
    }

    #[test]
    fn every_violation_is_reported_in_one_pass() {
        let bad_host = HostTemplate {
            hostname: "-bad-".into(),
            os: "beos".into(),
            size: "colossal".into(),
            disk_gib: 100_000,
            tags: vec![],
        };
        let bp = CreateBlueprint {
            name: "   ".into(),
            ..blueprint(vec![
                vpc("main", "10.0.0.1/16", vec![subnet("s", "not-a-cidr", vec![bad_host])]),
                vpc("", "10.1.0.0/16", vec![]),
            ])
        };
        let err = validate_blueprint(&bp).unwrap_err();
        let found = codes(&err);
        for expected in [
            ViolationCode::Required,
            ViolationCode::NonCanonicalCidr,
            ViolationCode::InvalidCidr,
            ViolationCode::InvalidHostname,
            ViolationCode::UnknownOs,
            ViolationCode::UnknownSize,
            ViolationCode::DiskTooLarge,
            ViolationCode::MissingChildren,
        ] {
            assert!(found.contains(&expected), "missing {expected:?} in {found:?}");
        }
    }

    #[test]
    fn windows_hosts_need_thirty_two_gib() {
        let mut h = host("dc01");
        h.os = "windows_2022".into();
        h.disk_gib = 16;
        let vpcs = vec![vpc("main", "10.0.0.0/16", vec![subnet("s", "10.0.1.0/24", vec![h])])];
        let err = validate_vpcs(&vpcs).unwrap_err();
        assert_eq!(codes(&err), vec![ViolationCode::DiskTooSmall]);
        assert_eq!(err.violations()[0].path, "vpcs[0].subnets[0].hosts[0].disk_gib");
    }

    #[test]
    fn empty_tree_is_rejected() {
        let err = validate_vpcs(&[]).unwrap_err();
        assert_eq!(codes(&err), vec![ViolationCode::MissingChildren]);
    }

    #[test]
    fn parse_cidr_requires_prefix_and_canonical_form() {
        assert_matches!(parse_cidr("10.0.0.0"), Err((ViolationCode::InvalidCidr, _)));
        assert_matches!(parse_cidr("10.0.0.0/33"), Err((ViolationCode::InvalidCidr, _)));
        assert_matches!(parse_cidr("10.0.1.7/24"), Err((ViolationCode::NonCanonicalCidr, _)));
        assert_matches!(parse_cidr(""), Err((ViolationCode::Required, _)));
        let net = parse_cidr(" 10.0.1.0/24 ").unwrap();
        assert_eq!(net.prefix(), 24);
    }

    #[test]
    fn containment_and_overlap_helpers() {
        let vpc = parse_cidr("10.0.0.0/16").unwrap();
        let inner = parse_cidr("10.0.255.0/24").unwrap();
        let outside = parse_cidr("10.1.0.0/24").unwrap();
        assert!(cidr_contains(vpc, inner));
        assert!(!cidr_contains(vpc, outside));
        assert!(!cidr_contains(inner, vpc));
        assert!(cidr_overlaps(vpc, inner));
        assert!(cidr_overlaps(inner, vpc));
        assert!(!cidr_overlaps(inner, outside));
    }

    #[test]
    fn display_joins_paths_and_messages() {
        let err = validate_vpcs(&[]).unwrap_err();
        assert_eq!(err.to_string(), "vpcs: A blueprint must define at least one VPC");
    }

    #[test]
    fn range_names_are_checked() {
        assert!(validate_range_name("red-team-1").is_ok());
        assert!(validate_range_name("").is_err());
        assert!(validate_range_name("a/b").is_err());
        assert!(validate_range_name(&"x".repeat(MAX_NAME_LEN + 1)).is_err());
    }
}
