use std::fmt;
use std::sync::OnceLock;

const M1: u64 = 0x5555_5555_5555_5555;
const M2: u64 = 0x3333_3333_3333_3333;
const M4: u64 = 0x0f0f_0f0f_0f0f_0f0f;
const H01: u64 = 0x0101_0101_0101_0101;

/// Divide-and-conquer population count, constant time on any target.
///
/// Sums adjacent 1-bit, 2-bit and 4-bit groups, then adds the eight byte
/// sums with one multiply into the top byte.
#[inline(always)]
pub const fn popcount_soft(v: u64) -> u32 {
    let x = v - ((v >> 1) & M1);
    let x = (x & M2) + ((x >> 2) & M2);
    let x = (x + (x >> 4)) & M4;
    (x.wrapping_mul(H01) >> 56) as u32
}

/// Hardware population count.
///
/// # Safety
/// The CPU must support `popcnt` (see [`PopcountBackend::hardware`]).
#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
#[target_feature(enable = "popcnt")]
#[inline]
pub unsafe fn popcount_hw(v: u64) -> u32 {
    v.count_ones()
}

/// Hardware population count. `cnt` is baseline on aarch64.
///
/// # Safety
/// Always safe to call on this target; `unsafe` only to match x86.
#[cfg(not(any(target_arch = "x86", target_arch = "x86_64")))]
#[inline]
pub unsafe fn popcount_hw(v: u64) -> u32 {
    v.count_ones()
}

/// Compile-time choice of bit counter for the scan kernel.
///
/// Kernels are generic over this so each backend gets its own
/// monomorphized loop instead of a branch per popcount.
pub trait BitCounter {
    fn popcount(v: u64) -> u32;
}

/// Native `count_ones`. Lowers to `popcnt`/`cnt` inside functions compiled
/// with the matching target feature.
pub struct Hardware;

/// [`popcount_soft`].
pub struct Software;

impl BitCounter for Hardware {
    #[inline(always)]
    fn popcount(v: u64) -> u32 {
        v.count_ones()
    }
}

impl BitCounter for Software {
    #[inline(always)]
    fn popcount(v: u64) -> u32 {
        popcount_soft(v)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Hardware,
    Software,
}

/// Popcount implementation selected for this process.
///
/// Only constructible through [`hardware`](Self::hardware),
/// [`software`](Self::software) or [`detect`](Self::detect), so a
/// hardware backend always means the instruction is present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PopcountBackend(Kind);

impl fmt::Display for PopcountBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self.0 {
            Kind::Hardware => "hardware",
            Kind::Software => "software",
        })
    }
}

impl PopcountBackend {
    /// The hardware backend, if this CPU has a population-count instruction.
    pub fn hardware() -> Option<Self> {
        if has_hw_popcount() {
            Some(PopcountBackend(Kind::Hardware))
        } else {
            None
        }
    }

    /// The portable backend. Always available.
    pub const fn software() -> Self {
        PopcountBackend(Kind::Software)
    }

    /// Best available backend. Detection runs once per process.
    pub fn detect() -> Self {
        static BACKEND: OnceLock<PopcountBackend> = OnceLock::new();
        *BACKEND.get_or_init(|| {
            let backend = Self::hardware().unwrap_or_else(Self::software);
            log::debug!("popcount backend: {}", backend);
            backend
        })
    }

    pub fn is_hardware(self) -> bool {
        self.0 == Kind::Hardware
    }

    /// Count set bits with this backend.
    #[inline]
    pub fn count(self, v: u64) -> u32 {
        match self.0 {
            // SAFETY: a Hardware backend is only handed out after detection.
            Kind::Hardware => unsafe { popcount_hw(v) },
            Kind::Software => popcount_soft(v),
        }
    }
}

fn has_hw_popcount() -> bool {
    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    {
        std::arch::is_x86_feature_detected!("popcnt")
    }
    #[cfg(target_arch = "aarch64")]
    {
        true
    }
    #[cfg(not(any(target_arch = "x86", target_arch = "x86_64", target_arch = "aarch64")))]
    {
        false
    }
}

/// Exact number of set bits in `v`, using the process-wide backend.
#[inline]
pub fn popcount64(v: u64) -> u32 {
    PopcountBackend::detect().count(v)
}
