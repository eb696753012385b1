//! enveloping - pure per-rib contact algorithms (geometric + sampling)

pub mod geometric;
pub mod kernel;
pub mod sampling;
pub mod types;

pub use types::*;

/// Canonical no-contact result: the disk's lowest rim point along the shell's
/// world-down direction, the shell's world-up axis, and zeroed scalars.
pub fn no_contact(rib: &Rib, frame: &RibFrame) -> (ContactOutput, bool) {
    let down = -(frame.up - frame.axis * frame.up.dot(&frame.axis));
    let len = down.norm();
    let point = if len > NORMAL_EPS {
        frame.center + down * (rib.radius / len)
    } else {
        // horizontal disk: every rim point is level, report the center
        frame.center
    };
    let out = ContactOutput {
        point,
        normal: frame.up,
        friction: 0.0,
        depth: 0.0,
        area: 0.0,
        volume: 0.0,
    };
    (out, false)
}
