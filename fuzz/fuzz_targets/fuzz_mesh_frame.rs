// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![no_main]

use libfuzzer_sys::fuzz_target;
use hdds_mesh::frame;

fuzz_target!(|data: &[u8]| {
    // Decoded fields must re-encode to a frame that decodes identically
    if let Ok(decoded) = frame::decode(data) {
        assert!(!decoded.topic.contains('\0'));
        assert!(!decoded.data.contains('\0'));
        if let Ok(encoded) = frame::encode(decoded.topic, decoded.data) {
            assert_eq!(frame::decode(&encoded).ok(), Some(decoded));
        }
    }
});
