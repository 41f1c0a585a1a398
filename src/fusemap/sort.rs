//! Stable sorted views over a fusemap's registers and fuses, used for
//! deterministic iteration (spec §4.3 "Sorting", §5 ordering guarantees).
//!
//! Grounded on `examples/original_source/fusemap/sort.go`.

use super::{Fuse, Register};

pub fn registers_by_read_address(mut regs: Vec<&Register>) -> Vec<&Register> {
    regs.sort_by_key(|r| r.read_address);
    regs
}

pub fn registers_by_write_address(mut regs: Vec<&Register>) -> Vec<&Register> {
    regs.sort_by_key(|r| r.write_address);
    regs
}

/// Sort by offset ascending; on a tie, longer fuses (aliases) first so they
/// print before the shorter subfields sharing their starting bit.
pub fn fuses_by_offset(mut fuses: Vec<&Fuse>) -> Vec<&Fuse> {
    fuses.sort_by(|a, b| a.offset.cmp(&b.offset).then(b.length.cmp(&a.length)));
    fuses
}
