// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![no_main]

use libfuzzer_sys::fuzz_target;
use hdds_mesh::{EventHandlerFn, HandlerTable, SubscriptionScope};

fn sink(_: &str, _: &str) {}

fuzz_target!(|data: &[u8]| {
    // First line: event name; remaining lines: filters to register
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let mut lines = text.split('\n');
    let event = lines.next().unwrap_or_default();

    let mut table: HandlerTable = HandlerTable::new();
    for filter in lines {
        let _ = table.add(filter, (sink as EventHandlerFn).into(), SubscriptionScope::AllDevices, None);
    }
    assert!(table.dispatch(event, "") <= table.len());
});
