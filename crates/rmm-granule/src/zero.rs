//! Zero-fill through a per-CPU mapping slot

use alloc::format;

use log::debug;
use rmm_hal::{BufferSlot, HalError, HAL};

use crate::table::GranuleRef;
use crate::types::GRANULE_SIZE;

/// Zero the granule behind `granule` through the calling CPU's `slot` window.
///
/// The caller holds the granule's lock, or otherwise owns its content, and
/// `slot` is not in use on this CPU. Mapping failures are reported on the
/// platform debug console and returned; the window is only unmapped if it
/// was mapped here.
///
/// Panics if `slot` is the foreign-content window: only monitor-owned
/// granules are zeroed.
pub fn zero_granule<H: HAL + ?Sized>(
    hal: &H,
    granule: GranuleRef<'_>,
    slot: BufferSlot,
) -> Result<(), HalError> {
    assert!(
        !slot.is_foreign(),
        "zero_granule through foreign slot {:?}",
        slot
    );

    let addr = granule.addr();
    let cpu = hal.cpu_id();
    let ptr = hal.map_granule(addr, slot, cpu).map_err(|e| {
        let msg = format!("zero_granule: map {} into {:?} on cpu {}: {}", addr, slot, cpu, e);
        debug!("{}", msg);
        hal.debug_write(&msg);
        e
    })?;

    // SAFETY: map_granule returned a window of GRANULE_SIZE bytes that is
    // exclusive to this CPU until unmap_slot below, and u8 has alignment 1.
    let window = unsafe { &mut *ptr.as_ptr().cast::<[u8; GRANULE_SIZE]>() };
    zero_mapped(window);

    hal.unmap_slot(slot, cpu);
    Ok(())
}

/// Zero a granule that is already mapped
pub fn zero_mapped(window: &mut [u8; GRANULE_SIZE]) {
    window.fill(0);
}
