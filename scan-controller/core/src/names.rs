//! Names of the objects a scan owns.
//!
//! Object names are limited to 63 characters. A friendly name is used when it fits; otherwise the
//! friendly name is hashed and the hash is appended to a fixed prefix. Either way the scan and
//! target are also recorded in the object's labels.

use sha2::{Digest, Sha256};

/// The target name used for a cluster-wide scan's single execution unit.
pub const PLATFORM_TARGET: &str = "platform";

const MAX_DNS_LEN: usize = 64;

// 20 bytes of hash encode to 40 hex characters, which leaves room for the longest prefix.
const HASH_BYTES: usize = 20;

const UNIT_HASH_PREFIX: &str = "openscap-pod-";
const AGGREGATOR_HASH_PREFIX: &str = "aggregator-pod-";
const RAW_RESULTS_HASH_PREFIX: &str = "raw-results-";

pub fn dns_length_name(hash_prefix: &str, friendly: String) -> String {
    if friendly.len() < MAX_DNS_LEN {
        return friendly;
    }

    let digest = Sha256::digest(friendly.as_bytes());
    format!("{}{}", hash_prefix, hex::encode(&digest[..HASH_BYTES]))
}

/// The execution unit that scans `target` for `scan`.
pub fn unit_name(scan: &str, target: &str) -> String {
    dns_length_name(UNIT_HASH_PREFIX, format!("{scan}-{target}-pod"))
}

/// The result record written by the execution unit for `target`.
///
/// Units and records are different kinds of object, so they share a name.
pub fn result_record_name(scan: &str, target: &str) -> String {
    unit_name(scan, target)
}

pub fn aggregator_name(scan: &str) -> String {
    dns_length_name(AGGREGATOR_HASH_PREFIX, format!("aggregator-pod-{scan}"))
}

pub fn raw_results_name(scan: &str) -> String {
    dns_length_name(RAW_RESULTS_HASH_PREFIX, scan.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_names_are_friendly() {
        assert_eq!(unit_name("cis", "worker-0"), "cis-worker-0-pod");
        assert_eq!(aggregator_name("cis"), "aggregator-pod-cis");
        assert_eq!(result_record_name("cis", PLATFORM_TARGET), "cis-platform-pod");
    }

    #[test]
    fn long_names_are_hashed() {
        let node = "ip-10-0-128-12.us-east-2.compute.internal";
        let name = unit_name("ocp4-cis-node-master", node);
        assert!(name.starts_with(UNIT_HASH_PREFIX));
        assert!(name.len() < MAX_DNS_LEN);
        // Hashing is stable so that every reconcile derives the same name.
        assert_eq!(name, unit_name("ocp4-cis-node-master", node));
        assert_ne!(name, unit_name("ocp4-cis-node-worker", node));
    }

    #[test]
    fn boundary_length() {
        let friendly = "a".repeat(MAX_DNS_LEN - 1);
        assert_eq!(dns_length_name("p-", friendly.clone()), friendly);
        let hashed = dns_length_name("p-", "a".repeat(MAX_DNS_LEN));
        assert_eq!(hashed.len(), 2 + 2 * HASH_BYTES);
    }
}
