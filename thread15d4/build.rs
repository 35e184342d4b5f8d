use std::collections::BTreeMap;
use std::env;
use std::fmt::Write;
use std::path::PathBuf;

fn main() {
    // (Variable, Type, Default value)
    let mut configs: BTreeMap<&str, (&str, &str)> = BTreeMap::from([
        ("MAX_CHILDREN", ("usize", "10")),
        ("MESSAGE_POOL_BUFFERS", ("usize", "64")),
        ("MAX_NETWORK_DATA_BYTES", ("usize", "254")),
        (
            "ADVERTISE_INTERVAL_MIN",
            ("Duration", "Duration::from_secs(1)"),
        ),
        (
            "ADVERTISE_INTERVAL_MAX",
            ("Duration", "Duration::from_secs(32)"),
        ),
        ("NETWORK_ID_TIMEOUT", ("u8", "120")),
        ("ROUTER_UPGRADE_THRESHOLD", ("u8", "16")),
        ("ROUTER_SELECTION_JITTER", ("u8", "120")),
        ("CONTEXT_ID_REUSE_DELAY", ("u32", "100")),
        ("ATTACH_RETRY_MAX", ("Duration", "Duration::from_secs(120)")),
        ("CHILD_TIMEOUT", ("u32", "240")),
        ("LEADER_WEIGHT", ("u8", "64")),
        ("FRAME_COUNTER_STORE_AHEAD", ("u32", "1000")),
        ("DATA_POLL_PERIOD", ("Duration", "Duration::from_secs(4)")),
    ]);

    // Make sure we get rerun if needed
    println!("cargo:rerun-if-changed=build.rs");
    for name in configs.keys() {
        println!("cargo:rerun-if-env-changed=THREAD15D4_{name}");
    }

    let mut data = String::new();
    writeln!(data, "#[allow(unused_imports)]").unwrap();
    writeln!(data, "use crate::time::Duration;").unwrap();

    for (var, value) in std::env::vars() {
        if let Some(name) = var.strip_prefix("THREAD15D4_") {
            // discard from hashmap as a way of consuming the setting
            let Some((_, (ty, _))) = configs.remove_entry(name) else {
                panic!("Wrong configuration name {name}");
            };

            writeln!(data, "pub const {name}: {ty} = {value};").unwrap();
        }
    }

    // Take the remaining configs and write the default value to the file
    for (name, (ty, value)) in configs.iter() {
        writeln!(data, "pub const {name}: {ty} = {value};").unwrap();
    }

    let out_dir = PathBuf::from(env::var_os("OUT_DIR").unwrap());
    let out_file = out_dir.join("config.rs");
    std::fs::write(out_file, data).unwrap();
}
