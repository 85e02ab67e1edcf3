//! Address-to-page mapping for the tracked memory region
//!
//! Converts a raw virtual address into a page index relative to the region's
//! base. Addresses outside `[base, base + page_size * num_pages)` and addresses
//! in the kernel band are rejected; callers discount them as expected noise.

use crate::config::{ConfigError, MappingConfig};
use thiserror::Error;

/// Index of a page within the tracked region, always `< num_pages`
pub type PageIndex = u64;

/// Why an address has no page in the tracked region
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapError {
    #[error("address {0:#x} is in kernel space")]
    KernelSpace(u64),

    #[error("address {0:#x} is below the tracked region")]
    BelowBase(u64),

    #[error("address {0:#x} is beyond the tracked region")]
    BeyondRegion(u64),
}

/// Maps addresses to page indices for one validated region
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageMapper {
    base: u64,
    /// Exclusive end of the region
    end: u64,
    page_size: u64,
    page_shift: u32,
    num_pages: u64,
    kernel_floor: u64,
}

impl PageMapper {
    /// Build a mapper, validating the mapping configuration first
    pub fn new(config: &MappingConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let base = config.resolved_base()?;
        let len = config.region_len().ok_or(ConfigError::RegionOverflow {
            base,
            num_pages: config.num_pages,
            page_size: config.page_size_bytes,
        })?;

        Ok(Self {
            base,
            end: base + len,
            page_size: config.page_size_bytes,
            page_shift: config.page_size_bytes.trailing_zeros(),
            num_pages: config.num_pages,
            kernel_floor: config.kernel_floor,
        })
    }

    /// Page index of `address`
    pub fn map(&self, address: u64) -> Result<PageIndex, MapError> {
        if address >= self.kernel_floor {
            return Err(MapError::KernelSpace(address));
        }
        if address < self.base {
            return Err(MapError::BelowBase(address));
        }
        if address >= self.end {
            return Err(MapError::BeyondRegion(address));
        }

        let offset = address - self.base;
        let aligned = offset & !(self.page_size - 1);
        Ok(aligned >> self.page_shift)
    }

    /// Address range `[start, end)` covered by `page`
    pub fn page_bounds(&self, page: PageIndex) -> Option<(u64, u64)> {
        if page >= self.num_pages {
            return None;
        }
        let start = self.base + page * self.page_size;
        Some((start, start + self.page_size))
    }

    pub fn num_pages(&self) -> u64 {
        self.num_pages
    }

    pub fn base(&self) -> u64 {
        self.base
    }

    pub fn page_size(&self) -> u64 {
        self.page_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapper() -> PageMapper {
        PageMapper::new(&MappingConfig::new(0x1000, 4096, 4)).unwrap()
    }

    #[test]
    fn test_maps_first_and_last_byte_of_page() {
        let m = mapper();
        assert_eq!(m.map(0x1000), Ok(0));
        assert_eq!(m.map(0x1fff), Ok(0));
        assert_eq!(m.map(0x2000), Ok(1));
        assert_eq!(m.map(0x3000), Ok(2));
        assert_eq!(m.map(0x4fff), Ok(3));
    }

    #[test]
    fn test_rejects_outside_region() {
        let m = mapper();
        assert_eq!(m.map(0x0fff), Err(MapError::BelowBase(0x0fff)));
        assert_eq!(m.map(0x5000), Err(MapError::BeyondRegion(0x5000)));
        assert_eq!(m.map(0), Err(MapError::BelowBase(0)));
    }

    #[test]
    fn test_rejects_kernel_addresses() {
        let m = mapper();
        assert_eq!(
            m.map(0xffff_ffff_8000_0000),
            Err(MapError::KernelSpace(0xffff_ffff_8000_0000))
        );
        assert!(matches!(m.map(u64::MAX), Err(MapError::KernelSpace(_))));
    }

    #[test]
    fn test_unaligned_base() {
        let m = PageMapper::new(&MappingConfig::new(0x1800, 4096, 2)).unwrap();
        assert_eq!(m.map(0x1800), Ok(0));
        assert_eq!(m.map(0x27ff), Ok(0));
        assert_eq!(m.map(0x2800), Ok(1));
        assert_eq!(m.map(0x3800), Err(MapError::BeyondRegion(0x3800)));
    }

    #[test]
    fn test_page_bounds() {
        let m = mapper();
        assert_eq!(m.page_bounds(0), Some((0x1000, 0x2000)));
        assert_eq!(m.page_bounds(3), Some((0x4000, 0x5000)));
        assert_eq!(m.page_bounds(4), None);
    }

    #[test]
    fn test_missing_base_is_fatal() {
        let config = MappingConfig::default();
        assert!(matches!(
            PageMapper::new(&config),
            Err(ConfigError::MissingBaseAddress)
        ));
    }
}
