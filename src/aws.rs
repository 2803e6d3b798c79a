//! AWS region selection
//!
//! Each Terraform test provisions into its own randomly chosen region so
//! parallel runs don't collide on per-region quotas or resource names.

use rand::seq::SliceRandom;

use crate::{Error, Result};

/// Regions with broad service coverage and reliable capacity
pub const STABLE_REGIONS: &[&str] = &[
    "us-east-1",
    "us-east-2",
    "us-west-1",
    "us-west-2",
    "eu-west-1",
    "eu-west-2",
    "eu-central-1",
    "ap-southeast-1",
    "ap-southeast-2",
    "ap-northeast-1",
    "ap-northeast-2",
    "ap-south-1",
    "ca-central-1",
    "sa-east-1",
];

/// Pick a random stable region
///
/// `approved` narrows the candidates to the stable regions it names; `None`
/// or an empty list means every stable region. `forbidden` removes regions
/// from them.
pub fn random_stable_region(
    approved: Option<&[&str]>,
    forbidden: Option<&[&str]>,
) -> Result<String> {
    let approved = approved.filter(|regions| !regions.is_empty());
    let forbidden = forbidden.unwrap_or(&[]);

    let candidates: Vec<&str> = STABLE_REGIONS
        .iter()
        .copied()
        .filter(|r| approved.map_or(true, |a| a.contains(r)))
        .filter(|r| !forbidden.contains(r))
        .collect();

    candidates
        .choose(&mut rand::thread_rng())
        .map(|r| r.to_string())
        .ok_or_else(|| Error::validation("no AWS regions left after applying restrictions"))
}

/// The first `count` availability zones of a region (`<region>a`, `<region>b`, ...)
pub fn availability_zones(region: &str, count: usize) -> Vec<String> {
    ('a'..='z')
        .take(count)
        .map(|suffix| format!("{region}{suffix}"))
        .collect()
}
