static NETWORKS: &[(&[&str], &[&str])] = &[
    (&["mainnet"], &[]),
    (&["calibrationnet"], &[]),
    (&["devnet", "testing"], &["short-proving-period"]),
];
const NETWORK_ENV: &str = "BUILD_FIL_NETWORK";

/// This build script enables _local_ compile features. These features do not
/// affect the dependency graph (they are not processed by Cargo). They are only
/// in effect for conditional compilation _in this crate_.
///
/// The actor crate only depends on this crate, so selecting the network here
/// keeps every actor build consistent without repeating the features.
fn main() {
    let network = std::env::var(NETWORK_ENV).ok();
    println!("cargo:rerun-if-env-changed={}", NETWORK_ENV);

    let network = network.as_deref().unwrap_or("mainnet");
    let features = NETWORKS.iter().find(|(k, _)| k.contains(&network)).expect("unknown network").1;
    for feature in features {
        println!("cargo:rustc-cfg=feature=\"{}\"", feature);
    }
}
