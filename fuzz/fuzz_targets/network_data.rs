#![no_main]

use thread15d4::network_data::NetworkData;

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(network_data) = NetworkData::from_bytes(data) else {
        return;
    };

    for _ in network_data.border_routers() {}
    for _ in network_data.external_routes() {}
    for _ in network_data.contexts() {}

    let stable = network_data.stable();
    assert!(stable.len() <= network_data.len());
});
