//! The legacy-region compatibility path. The original could build against
//! either this `vm`-style area model or its older `dumbvm`/`atable`
//! allocators (a build-time switch — see spec.md §9). Those legacy
//! allocators are out of scope for this core; what's in scope is giving the
//! `ENOSYS` path in the error taxonomy an actual caller, so code written
//! against the legacy interface fails predictably instead of not compiling
//! at all.

use crate::addrspace::AddressSpace;
use crate::area::{AreaKind, Permissions};
use crate::config::MAX_LEGACY_REGIONS;
use crate::error::{VmError, VmResult};
use crate::loader::Executable;

/// Registers a legacy-style region. The first `MAX_LEGACY_REGIONS` succeed
/// (as an ordinary anonymous area); anything past that is `ENOSYS`, since a
/// real legacy allocator would be needed to back more than a couple of
/// compatibility regions and none is implemented here.
pub fn define_legacy_region<E: Executable>(
    a_s: &mut AddressSpace<E>,
    start: usize,
    end: usize,
    perms: Permissions,
) -> VmResult<()> {
    if a_s.legacy_region_count() >= MAX_LEGACY_REGIONS {
        return Err(VmError::NotImplemented);
    }
    a_s.as_define_region(start, end, perms, AreaKind::AnonymousMapping)?;
    a_s.bump_legacy_region_count();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::MemExecutable;

    #[test]
    fn third_legacy_region_is_not_implemented() {
        let mut a_s = AddressSpace::<MemExecutable>::new();
        let perms = Permissions::READ | Permissions::WRITE | Permissions::MAY_READ | Permissions::MAY_WRITE;
        define_legacy_region(&mut a_s, 0, 0x1000, perms).unwrap();
        define_legacy_region(&mut a_s, 0x1000, 0x2000, perms).unwrap();
        let err = define_legacy_region(&mut a_s, 0x2000, 0x3000, perms).unwrap_err();
        assert_eq!(err, VmError::NotImplemented);
    }
}
