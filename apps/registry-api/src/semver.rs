//! Version ordering for firmware listings.
//!
//! Lenient on purpose: device vendors publish things like `v2.1`,
//! `1.0.0-rc1` or `2024.03.build7`, and all of them must sort.

use std::cmp::Ordering;

/// Compare two version strings.
///
/// A leading `v` is ignored. Dot-separated components compare numerically
/// when both are numbers and lexically when neither is; a number sorts
/// before a non-number. Missing components count as `0`. A pre-release
/// suffix after `-` sorts before the plain release.
#[must_use]
pub fn compare(a: &str, b: &str) -> Ordering {
    let (a_core, a_pre) = split(a);
    let (b_core, b_pre) = split(b);

    compare_components(a_core, b_core).then_with(|| match (a_pre, b_pre) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(x), Some(y)) => compare_components(x, y),
    })
}

/// Sort newest first.
pub fn sort_newest_first<T>(items: &mut [T], version: impl Fn(&T) -> &str) {
    items.sort_by(|x, y| compare(version(y), version(x)));
}

fn split(version: &str) -> (&str, Option<&str>) {
    let trimmed = version.trim();
    let trimmed = trimmed
        .strip_prefix('v')
        .or_else(|| trimmed.strip_prefix('V'))
        .unwrap_or(trimmed);
    match trimmed.split_once('-') {
        Some((core, pre)) => (core, Some(pre)),
        None => (trimmed, None),
    }
}

fn compare_components(a: &str, b: &str) -> Ordering {
    let mut left = a.split('.');
    let mut right = b.split('.');
    loop {
        match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (x, y) => {
                let ord = compare_part(x.unwrap_or("0"), y.unwrap_or("0"));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}

fn compare_part(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}
