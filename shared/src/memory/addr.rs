use core::cmp::min;
use core::fmt::Debug;
use core::hash::Hash;
use core::marker::PhantomData;

pub trait AddressType: Clone + Copy + Eq + Ord + PartialEq + PartialOrd + Debug + Hash {}

#[derive(Clone, Copy, Eq, Ord, PartialEq, PartialOrd, Debug, Hash)]
pub struct PhysAddressType;

#[derive(Clone, Copy, Eq, Ord, PartialEq, PartialOrd, Debug, Hash)]
pub struct VirtAddressType;

impl AddressType for PhysAddressType {}
impl AddressType for VirtAddressType {}

#[derive(Clone, Copy, Eq, Ord, PartialEq, PartialOrd, Debug, Hash)]
pub struct Address<Type: AddressType>(u64, PhantomData<Type>);

pub type PhysAddress = Address<PhysAddressType>;
pub type VirtAddress = Address<VirtAddressType>;

impl<Type: AddressType> Address<Type> {
    pub const fn from_raw(val: u64) -> Self {
        Self(val, PhantomData)
    }

    pub const fn zero() -> Self {
        Self::from_raw(0)
    }

    pub const fn as_raw(self) -> u64 {
        self.0
    }

    pub fn distance_from(self, left: Self) -> Length {
        assert!(self >= left);
        Length::from_raw(self.as_raw() - left.as_raw())
    }

    pub fn distance_to(self, right: Self) -> Length {
        assert!(self <= right);
        Length::from_raw(right.as_raw() - self.as_raw())
    }

    pub fn offset_by(self, length: Length) -> Self {
        self.offset_by_checked(length).unwrap()
    }

    pub fn offset_by_checked(self, length: Length) -> Option<Self> {
        if length.as_raw() > u64::MAX - self.as_raw() {
            return None;
        }

        Some(Self::from_raw(self.as_raw() + length.as_raw()))
    }

    pub fn is_aligned_to(self, alignment: u64) -> bool {
        self == self.align_down(alignment)
    }

    /// Returns the last address below `self` that is aligned to `alignment`,
    /// which must be a power of two.
    pub fn align_down(self, alignment: u64) -> Self {
        Self::from_raw(align_u64_down(self.as_raw(), alignment))
    }

    /// Returns the first address above `self` that is aligned to `alignment`,
    /// which must be a power of two.
    pub fn align_up(self, alignment: u64) -> Self {
        Self::from_raw(align_u64_up(self.as_raw(), alignment))
    }
}

#[derive(Clone, Copy, Eq, Ord, PartialEq, PartialOrd, Debug, Hash)]
pub struct Length(u64);

impl Length {
    pub const fn from_raw(val: u64) -> Length {
        Length(val)
    }

    pub const fn as_raw(self) -> u64 {
        self.0
    }

    pub fn add(self, rhs: Length) -> Length {
        Length::from_raw(self.as_raw() + rhs.as_raw())
    }

    pub fn subtract(self, rhs: Length) -> Length {
        assert!(self.as_raw() >= rhs.as_raw());
        Length::from_raw(self.as_raw() - rhs.as_raw())
    }

    pub fn times(self, x: u64) -> Length {
        Self::from_raw(self.as_raw().checked_mul(x).unwrap())
    }

    /// Returns the first length greater than `self` that is aligned to
    /// `alignment`, which must be a power of two.
    pub fn align_up(self, alignment: u64) -> Length {
        Length::from_raw(align_u64_up(self.as_raw(), alignment))
    }
}

#[derive(Clone, Copy, Eq, PartialEq, Debug, Hash)]
#[repr(C)]
pub struct Extent<Type: AddressType> {
    pub address: Address<Type>,
    pub length: Length,
}

pub type PhysExtent = Extent<PhysAddressType>;
pub type VirtExtent = Extent<VirtAddressType>;

impl<Type: AddressType> Extent<Type> {
    pub fn new(address: Address<Type>, length: Length) -> Self {
        Self::new_checked(address, length).unwrap()
    }

    pub fn new_checked(address: Address<Type>, length: Length) -> Option<Self> {
        if length.as_raw() == 0 || length.as_raw() > u64::MAX - address.as_raw() {
            None
        } else {
            Some(Self { address, length })
        }
    }

    /// Like `new`, but usable in constant context. The length must be nonzero
    /// and must not wrap.
    pub const fn from_raw(address: u64, length: u64) -> Self {
        assert!(length != 0 && length <= u64::MAX - address);
        Self {
            address: Address::from_raw(address),
            length: Length::from_raw(length),
        }
    }

    pub fn from_range_exclusive(begin: Address<Type>, end: Address<Type>) -> Self {
        Self {
            address: begin,
            length: begin.distance_to(end),
        }
    }

    pub const fn address(self) -> Address<Type> {
        self.address
    }

    pub const fn length(self) -> Length {
        self.length
    }

    /// The first address just outside us, to the right.
    pub fn end_address(self) -> Address<Type> {
        self.address.offset_by(self.length)
    }

    /// The last address in the extent.
    pub fn last_address(self) -> Address<Type> {
        self.address
            .offset_by(self.length.subtract(Length::from_raw(1)))
    }

    pub fn contains(self, other: Self) -> bool {
        self.address <= other.address && other.end_address() <= self.end_address()
    }

    pub fn overlap(self, other: Self) -> Option<Self> {
        if self.address > other.address {
            return other.overlap(self);
        }

        let overlap_start = other.address;

        if self.address.distance_to(overlap_start) >= self.length {
            return None;
        }

        let overlap_length = min(
            self.length
                .subtract(self.address.distance_to(overlap_start)),
            other.length,
        );

        Some(Self {
            address: overlap_start,
            length: overlap_length,
        })
    }

    pub fn has_overlap(self, other: Self) -> bool {
        self.overlap(other).is_some()
    }

    pub fn is_aligned_to(self, alignment: u64) -> bool {
        self.address.is_aligned_to(alignment) && self.length.align_up(alignment) == self.length
    }
}

/// Given power-of-two `alignment`, returns the largest value below `x` aligned
/// to `alignment`
const fn align_u64_down(x: u64, alignment: u64) -> u64 {
    let mask = !(alignment - 1);
    x & mask
}

/// Given power-of-two `alignment`, returns the smallest value above `x` aligned
/// to `alignment`
const fn align_u64_up(x: u64, alignment: u64) -> u64 {
    align_u64_down(x + (alignment - 1), alignment)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn align_raw() {
        assert_eq!(align_u64_down(0, 2), 0);
        assert_eq!(align_u64_down(1, 2), 0);
        assert_eq!(align_u64_down(2, 2), 2);

        assert_eq!(align_u64_up(0, 2), 0);
        assert_eq!(align_u64_up(1, 2), 2);
        assert_eq!(align_u64_up(2, 2), 2);

        assert_eq!(align_u64_down(255, 1024), 0);
        assert_eq!(align_u64_up(255, 1024), 1024);
    }

    #[test]
    fn align_address() {
        assert_eq!(
            PhysAddress::from_raw(1).align_down(1024),
            PhysAddress::from_raw(0)
        );
        assert_eq!(
            PhysAddress::from_raw(1).align_up(1024),
            PhysAddress::from_raw(1024)
        );
        assert_eq!(
            PhysAddress::from_raw(1024).align_down(1024),
            PhysAddress::from_raw(1024)
        );
        assert_eq!(
            PhysAddress::from_raw(1024).align_up(1024),
            PhysAddress::from_raw(1024)
        );
    }

    #[test]
    fn extent_endpoints() {
        let extent = PhysExtent::from_raw(0x1000, 0x200);
        assert_eq!(extent.end_address(), PhysAddress::from_raw(0x1200));
        assert_eq!(extent.last_address(), PhysAddress::from_raw(0x11FF));
    }

    #[test]
    fn overlap_extent() {
        assert_eq!(
            PhysExtent::from_raw(0, 8).overlap(PhysExtent::from_raw(0, 8)),
            Some(PhysExtent::from_raw(0, 8))
        );

        assert_eq!(
            PhysExtent::from_raw(0, 8).overlap(PhysExtent::from_raw(8, 8)),
            None
        );
        assert_eq!(
            PhysExtent::from_raw(0, 8).overlap(PhysExtent::from_raw(1024, 8)),
            None
        );

        assert_eq!(
            PhysExtent::from_raw(5, 5).overlap(PhysExtent::from_raw(8, 7)),
            Some(PhysExtent::from_raw(8, 2))
        );
        assert_eq!(
            PhysExtent::from_raw(8, 7).overlap(PhysExtent::from_raw(5, 5)),
            Some(PhysExtent::from_raw(8, 2))
        );

        assert_eq!(
            PhysExtent::from_raw(0, 10).overlap(PhysExtent::from_raw(2, 3)),
            Some(PhysExtent::from_raw(2, 3))
        );
    }

    #[test]
    fn contains_extent() {
        let outer = PhysExtent::from_raw(0x100000, 0x8000000);
        assert!(outer.contains(PhysExtent::from_raw(0x100000, 0x6400000)));
        assert!(outer.contains(outer));
        assert!(!outer.contains(PhysExtent::from_raw(0x0, 0x200000)));
        assert!(!outer.contains(PhysExtent::from_raw(0x8000000, 0x200000)));
    }
}
