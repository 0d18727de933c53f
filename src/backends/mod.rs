//! Backend adapters and the tag → adapter registry.
//!
//! The registry is resolved once per engine: every façade operation then
//! routes through the adapter chosen at construction. A tag without an
//! adapter in this build simply does not exist ([`BackendTag::exists`]
//! is false).
//!
//! [`BackendTag::exists`]: crate::BackendTag::exists

mod null;
mod system;

use crate::backend::{Backend, BackendTag};

/// The tag served by the cpal-based system adapter on this platform.
fn system_tag() -> BackendTag {
    if cfg!(target_os = "windows") {
        BackendTag::Wasapi
    } else if cfg!(target_os = "macos") {
        BackendTag::CoreAudio
    } else {
        BackendTag::Alsa
    }
}

/// Resolves a tag to its adapter, or `None` when this build carries none.
pub(crate) fn lookup(tag: BackendTag) -> Option<&'static dyn Backend> {
    match tag {
        BackendTag::Dummy => Some(&null::NULL),
        tag if tag == system_tag() => Some(&system::SYSTEM),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dummy_resolves_everywhere() {
        assert!(lookup(BackendTag::Dummy).is_some());
    }

    #[test]
    fn test_exactly_one_system_adapter() {
        let present = [
            BackendTag::Alsa,
            BackendTag::Wasapi,
            BackendTag::CoreAudio,
        ]
        .into_iter()
        .filter(|&tag| lookup(tag).is_some())
        .count();
        assert_eq!(present, 1);
    }

    #[test]
    fn test_unshipped_hosts_resolve_to_nothing() {
        for tag in [
            BackendTag::Oss,
            BackendTag::Sndio,
            BackendTag::PulseAudio,
            BackendTag::PipeWire,
        ] {
            assert!(lookup(tag).is_none());
        }
    }
}
