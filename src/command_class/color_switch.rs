//! Color Switch command class (0x33). Outbound only.

use bytes::Bytes;

use super::CommandClassId;
use crate::error::{Result, ZWaveError};

pub const SET: u8 = 0x05;

/// Apply the new color immediately.
pub const DURATION_INSTANT: u8 = 0x00;
/// Use the device's configured transition time.
pub const DURATION_DEFAULT: u8 = 0xFF;

const MAX_COMPONENTS: usize = 0x1F;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ColorComponent {
    WarmWhite = 0,
    ColdWhite = 1,
    Red = 2,
    Green = 3,
    Blue = 4,
    Amber = 5,
    Cyan = 6,
    Purple = 7,
}

/// `[0x33, 0x05, count, (component, value)*, duration]`.
pub fn set(components: &[(ColorComponent, u8)], duration: u8) -> Result<Bytes> {
    if components.len() > MAX_COMPONENTS {
        return Err(ZWaveError::InvalidArgument(format!(
            "{} color components, at most {} allowed",
            components.len(),
            MAX_COMPONENTS
        )));
    }

    let mut out = Vec::with_capacity(4 + components.len() * 2);
    out.push(CommandClassId::ColorSwitch as u8);
    out.push(SET);
    out.push(components.len() as u8 & 0x1F);
    for (component, value) in components {
        out.push(*component as u8);
        out.push(*value);
    }
    out.push(duration);
    Ok(out.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_rgb() {
        let bytes = set(
            &[
                (ColorComponent::Red, 0xFF),
                (ColorComponent::Green, 0x80),
                (ColorComponent::Blue, 0x00),
            ],
            DURATION_INSTANT,
        )
        .unwrap();
        assert_eq!(
            bytes.as_ref(),
            &[0x33, 0x05, 0x03, 0x02, 0xFF, 0x03, 0x80, 0x04, 0x00, 0x00]
        );
    }

    #[test]
    fn test_too_many_components() {
        let many = vec![(ColorComponent::Red, 0u8); 32];
        assert!(set(&many, DURATION_DEFAULT).is_err());
    }
}
