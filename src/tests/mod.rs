//! Cross-module scenarios for the relay.

mod relay_roundtrip_test;
