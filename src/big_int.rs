use crate::memory::ResourceHandle;
use crate::res_vec::ResVec;
use crate::{Error, Result};
use std::cmp::Ordering;
use std::fmt;
use std::ops::{
    Add, AddAssign, BitAnd, BitAndAssign, BitOr, BitOrAssign, BitXor, BitXorAssign, Div, DivAssign,
    Mul, MulAssign, Neg, Not, Rem, RemAssign, Shl, ShlAssign, Shr, ShrAssign, Sub, SubAssign,
};
use std::str::FromStr;

/// Limbs above this count switch multiplication to Karatsuba.
const KARATSUBA_CUTOFF: usize = 32;
/// Karatsuba recursion bottoms out to schoolbook below this limb count.
const KARATSUBA_BASE: usize = 8;

/// Arbitrary-precision integer: sign flag plus little-endian base-2^32
/// limbs in a [`ResVec`], so digit storage goes through the memory-resource
/// contract. Canonical form: no trailing zero limb except the single-limb
/// zero, which is non-negative.
#[derive(Clone, PartialEq, Eq)]
pub struct BigInt {
    negative: bool,
    limbs: ResVec<u32>,
}

impl BigInt {
    pub fn new_in(resource: ResourceHandle) -> Self {
        let mut limbs = ResVec::new_in(resource);
        limbs.push(0);
        BigInt {
            negative: false,
            limbs,
        }
    }

    pub fn zero() -> Self {
        Self::new_in(ResourceHandle::default())
    }

    pub fn from_u64_in(value: u64, resource: ResourceHandle) -> Self {
        let mut n = Self::new_in(resource);
        n.limbs[0] = value as u32;
        if value >> 32 != 0 {
            n.limbs.push((value >> 32) as u32);
        }
        n
    }

    pub fn from_i64_in(value: i64, resource: ResourceHandle) -> Self {
        let mut n = Self::from_u64_in(value.unsigned_abs(), resource);
        n.negative = value < 0;
        n
    }

    fn from_limbs_in(limbs: &[u32], negative: bool, resource: ResourceHandle) -> Self {
        let mut n = BigInt {
            negative,
            limbs: ResVec::from_slice_in(limbs, resource),
        };
        if n.limbs.is_empty() {
            n.limbs.push(0);
        }
        n.normalize();
        n
    }

    /// Parses an optional sign followed by digits in `radix ∈ [2, 36]`.
    pub fn from_str_radix_in(s: &str, radix: u32, resource: ResourceHandle) -> Result<Self> {
        if !(2..=36).contains(&radix) {
            return Err(Error::InvalidArgument("radix must be in [2, 36]"));
        }
        let bytes = s.as_bytes();
        let (negative, digits) = match bytes.first() {
            Some(b'-') => (true, &bytes[1..]),
            Some(b'+') => (false, &bytes[1..]),
            _ => (false, bytes),
        };
        if digits.is_empty() {
            return Err(Error::InvalidArgument("empty numeric literal"));
        }
        let mut n = Self::new_in(resource);
        for &c in digits {
            let value = match c {
                b'0'..=b'9' => (c - b'0') as u32,
                b'a'..=b'z' => (c - b'a') as u32 + 10,
                b'A'..=b'Z' => (c - b'A') as u32 + 10,
                _ => return Err(Error::InvalidArgument("stray character in numeric literal")),
            };
            if value >= radix {
                return Err(Error::InvalidArgument("digit out of range for radix"));
            }
            // n = n * radix + value
            let mut carry = value as u64;
            for limb in n.limbs.iter_mut() {
                let prod = *limb as u64 * radix as u64 + carry;
                *limb = prod as u32;
                carry = prod >> 32;
            }
            if carry > 0 {
                n.limbs.push(carry as u32);
            }
        }
        n.negative = negative && !n.is_zero();
        Ok(n)
    }

    pub fn from_str_radix(s: &str, radix: u32) -> Result<Self> {
        Self::from_str_radix_in(s, radix, ResourceHandle::default())
    }

    pub fn resource(&self) -> &ResourceHandle {
        self.limbs.resource()
    }

    pub fn is_zero(&self) -> bool {
        self.limbs.len() == 1 && self.limbs[0] == 0
    }

    pub fn is_negative(&self) -> bool {
        self.negative
    }

    pub fn limb_count(&self) -> usize {
        self.limbs.len()
    }

    pub fn abs(&self) -> BigInt {
        let mut n = self.clone();
        n.negative = false;
        n
    }

    pub fn to_u64(&self) -> Option<u64> {
        if self.negative || self.limbs.len() > 2 {
            return None;
        }
        let lo = self.limbs[0] as u64;
        let hi = *self.limbs.get(1).unwrap_or(&0) as u64;
        Some(hi << 32 | lo)
    }

    fn set_zero(&mut self) {
        self.limbs.truncate(1);
        self.limbs[0] = 0;
        self.negative = false;
    }

    fn normalize(&mut self) {
        while self.limbs.len() > 1 && *self.limbs.last().unwrap() == 0 {
            self.limbs.pop();
        }
        if self.is_zero() {
            self.negative = false;
        }
    }

    /// `self += other · B^shift` with full sign handling; `shift` counts
    /// low-order zero limbs on `other`.
    pub fn add_shifted(&mut self, other: &BigInt, shift: usize) {
        if other.is_zero() {
            return;
        }
        if self.negative == other.negative {
            self.abs_add(&other.limbs, shift);
        } else {
            match cmp_abs_shifted(&self.limbs, &other.limbs, shift) {
                Ordering::Greater => self.abs_sub(&other.limbs, shift),
                Ordering::Equal => self.set_zero(),
                Ordering::Less => {
                    self.abs_rsub(&other.limbs, shift);
                    self.negative = other.negative;
                }
            }
        }
        self.normalize();
    }

    /// `self -= other · B^shift`.
    pub fn sub_shifted(&mut self, other: &BigInt, shift: usize) {
        if other.is_zero() {
            return;
        }
        if self.negative != other.negative {
            self.abs_add(&other.limbs, shift);
        } else {
            match cmp_abs_shifted(&self.limbs, &other.limbs, shift) {
                Ordering::Greater => self.abs_sub(&other.limbs, shift),
                Ordering::Equal => self.set_zero(),
                Ordering::Less => {
                    self.abs_rsub(&other.limbs, shift);
                    self.negative = !self.negative;
                }
            }
        }
        self.normalize();
    }

    fn abs_add(&mut self, other: &[u32], shift: usize) {
        let max_len = self.limbs.len().max(other.len() + shift);
        self.limbs.resize(max_len, 0);
        let mut carry = 0u64;
        for i in shift..max_len {
            let sum = self.limbs[i] as u64 + *other.get(i - shift).unwrap_or(&0) as u64 + carry;
            self.limbs[i] = sum as u32;
            carry = sum >> 32;
        }
        if carry > 0 {
            self.limbs.push(carry as u32);
        }
    }

    /// requires `|self| >= |other · B^shift|`
    fn abs_sub(&mut self, other: &[u32], shift: usize) {
        let mut borrow = 0i64;
        for i in shift..self.limbs.len() {
            let mut diff =
                self.limbs[i] as i64 - *other.get(i - shift).unwrap_or(&0) as i64 + borrow;
            if diff < 0 {
                diff += 1 << 32;
                borrow = -1;
            } else {
                borrow = 0;
            }
            self.limbs[i] = diff as u32;
        }
        debug_assert_eq!(borrow, 0);
    }

    /// `self = |other · B^shift| - |self|`; requires the magnitude order
    fn abs_rsub(&mut self, other: &[u32], shift: usize) {
        let len = other.len() + shift;
        self.limbs.resize(len, 0);
        let mut borrow = 0i64;
        for i in 0..len {
            let o = if i < shift {
                0
            } else {
                other[i - shift] as i64
            };
            let mut diff = o - self.limbs[i] as i64 + borrow;
            if diff < 0 {
                diff += 1 << 32;
                borrow = -1;
            } else {
                borrow = 0;
            }
            self.limbs[i] = diff as u32;
        }
        debug_assert_eq!(borrow, 0);
    }

    /// Schoolbook product; also the Karatsuba base case.
    pub fn mul_schoolbook(&self, other: &BigInt) -> BigInt {
        if self.is_zero() || other.is_zero() {
            return BigInt::new_in(self.resource().clone());
        }
        let mut result = ResVec::new_in(self.resource().clone());
        result.resize(self.limbs.len() + other.limbs.len(), 0u32);
        for i in 0..self.limbs.len() {
            let mut carry = 0u64;
            let mut j = 0;
            while j < other.limbs.len() || carry > 0 {
                let mut prod = result[i + j] as u64 + carry;
                if j < other.limbs.len() {
                    prod += self.limbs[i] as u64 * other.limbs[j] as u64;
                }
                result[i + j] = prod as u32;
                carry = prod >> 32;
                j += 1;
            }
        }
        let mut out = BigInt {
            negative: self.negative != other.negative,
            limbs: result,
        };
        out.normalize();
        out
    }

    /// Karatsuba product, splitting at `⌈max/2⌉` limbs and bottoming out to
    /// schoolbook under [`KARATSUBA_BASE`]. Equal to [`Self::mul_schoolbook`]
    /// on every input.
    pub fn mul_karatsuba(&self, other: &BigInt) -> BigInt {
        let mut out = karatsuba_abs(&self.limbs, &other.limbs, self.resource());
        out.negative = self.negative != other.negative && !out.is_zero();
        out
    }

    fn mul_limb(&self, m: u32) -> BigInt {
        let mut out = self.clone();
        out.negative = false;
        let mut carry = 0u64;
        for limb in out.limbs.iter_mut() {
            let prod = *limb as u64 * m as u64 + carry;
            *limb = prod as u32;
            carry = prod >> 32;
        }
        if carry > 0 {
            out.limbs.push(carry as u32);
        }
        out.normalize();
        out
    }

    /// In-place magnitude division by a single limb, returning the remainder.
    fn div_small(&mut self, d: u32) -> u32 {
        debug_assert!(d != 0);
        let mut rem = 0u64;
        for i in (0..self.limbs.len()).rev() {
            let cur = rem << 32 | self.limbs[i] as u64;
            self.limbs[i] = (cur / d as u64) as u32;
            rem = cur % d as u64;
        }
        self.normalize();
        rem as u32
    }

    /// Truncated division: quotient rounds toward zero, remainder takes the
    /// dividend's sign, so `(x / y) · y + x % y == x`.
    pub fn div_rem(&self, other: &BigInt) -> Result<(BigInt, BigInt)> {
        if other.is_zero() {
            return Err(Error::Domain("division by zero"));
        }
        if self.is_zero() {
            return Ok((
                BigInt::new_in(self.resource().clone()),
                BigInt::new_in(self.resource().clone()),
            ));
        }
        if cmp_abs_shifted(&self.limbs, &other.limbs, 0) == Ordering::Less {
            let mut rem = self.clone();
            rem.normalize();
            return Ok((BigInt::new_in(self.resource().clone()), rem));
        }

        if other.limbs.len() == 1 {
            let mut quot = self.abs();
            let rem = quot.div_small(other.limbs[0]);
            quot.negative = self.negative != other.negative && !quot.is_zero();
            let mut rem = BigInt::from_u64_in(rem as u64, self.resource().clone());
            rem.negative = self.negative && !rem.is_zero();
            return Ok((quot, rem));
        }

        let divisor = other.abs();
        let mut quotient = ResVec::new_in(self.resource().clone());
        quotient.resize(self.limbs.len(), 0u32);
        let mut remain = BigInt::new_in(self.resource().clone());
        for i in (0..self.limbs.len()).rev() {
            remain.limbs.insert(0, self.limbs[i]);
            remain.normalize();
            if remain < divisor {
                // quotient digit is 0, skip the search
                continue;
            }

            // binary search the quotient digit: largest q with divisor·q <= remain
            let mut left = 0u64;
            let mut right = u32::MAX as u64;
            let mut q = 0u64;
            while left <= right {
                let mid = left + (right - left) / 2;
                let trial = divisor.mul_limb(mid as u32);
                if trial <= remain {
                    q = mid;
                    left = mid + 1;
                } else {
                    if mid == 0 {
                        break;
                    }
                    right = mid - 1;
                }
            }
            if q > 0 {
                remain.sub_shifted(&divisor.mul_limb(q as u32), 0);
            }
            quotient[i] = q as u32;
        }

        let mut quot = BigInt {
            negative: false,
            limbs: quotient,
        };
        quot.normalize();
        quot.negative = self.negative != other.negative && !quot.is_zero();
        remain.negative = self.negative && !remain.is_zero();
        Ok((quot, remain))
    }

    pub fn to_string_radix10(&self) -> String {
        if self.is_zero() {
            return "0".to_string();
        }
        let mut digits = Vec::new();
        let mut tmp = self.abs();
        while !tmp.is_zero() {
            let d = tmp.div_small(10);
            digits.push(b'0' + d as u8);
        }
        if self.negative {
            digits.push(b'-');
        }
        digits.reverse();
        String::from_utf8(digits).unwrap()
    }
}

fn cmp_abs_shifted(a: &[u32], b: &[u32], shift: usize) -> Ordering {
    let b_zero = b.len() == 1 && b[0] == 0;
    let b_len = if b_zero { 1 } else { b.len() + shift };
    if a.len() != b_len {
        return a.len().cmp(&b_len);
    }
    for i in (0..a.len()).rev() {
        let bv = if b_zero || i < shift { 0 } else { b[i - shift] };
        match a[i].cmp(&bv) {
            Ordering::Equal => {}
            ord => return ord,
        }
    }
    Ordering::Equal
}

fn karatsuba_abs(a: &[u32], b: &[u32], resource: &ResourceHandle) -> BigInt {
    let a_mag = BigInt::from_limbs_in(a, false, resource.clone());
    let b_mag = BigInt::from_limbs_in(b, false, resource.clone());
    if a_mag.limbs.len() <= KARATSUBA_BASE || b_mag.limbs.len() <= KARATSUBA_BASE {
        return a_mag.mul_schoolbook(&b_mag);
    }
    let m = (a_mag.limbs.len().max(b_mag.limbs.len()) + 1) / 2;
    let split = |n: &BigInt| {
        let lo = BigInt::from_limbs_in(&n.limbs[..m.min(n.limbs.len())], false, resource.clone());
        let hi = if n.limbs.len() > m {
            BigInt::from_limbs_in(&n.limbs[m..], false, resource.clone())
        } else {
            BigInt::new_in(resource.clone())
        };
        (lo, hi)
    };
    let (lo1, hi1) = split(&a_mag);
    let (lo2, hi2) = split(&b_mag);

    let z0 = karatsuba_abs(&lo1.limbs, &lo2.limbs, resource);
    let z2 = karatsuba_abs(&hi1.limbs, &hi2.limbs, resource);
    let sum1 = &lo1 + &hi1;
    let sum2 = &lo2 + &hi2;
    let mut z1 = karatsuba_abs(&sum1.limbs, &sum2.limbs, resource);
    z1.sub_shifted(&z0, 0);
    z1.sub_shifted(&z2, 0);

    // (h1·B^m + l1)(h2·B^m + l2) = h1h2·B^2m + ((h1+l1)(h2+l2) − h1h2 − l1l2)·B^m + l1l2
    let mut result = z0;
    result.add_shifted(&z1, m);
    result.add_shifted(&z2, 2 * m);
    result
}

impl Ord for BigInt {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.negative, other.negative) {
            (false, true) => Ordering::Greater,
            (true, false) => Ordering::Less,
            (neg, _) => {
                let mag = cmp_abs_shifted(&self.limbs, &other.limbs, 0);
                if neg {
                    mag.reverse()
                } else {
                    mag
                }
            }
        }
    }
}

impl PartialOrd for BigInt {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for BigInt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_radix10())
    }
}

impl fmt::Debug for BigInt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_radix10())
    }
}

impl FromStr for BigInt {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_str_radix(s, 10)
    }
}

impl From<u64> for BigInt {
    fn from(value: u64) -> Self {
        Self::from_u64_in(value, ResourceHandle::default())
    }
}

impl From<i64> for BigInt {
    fn from(value: i64) -> Self {
        Self::from_i64_in(value, ResourceHandle::default())
    }
}

impl From<u32> for BigInt {
    fn from(value: u32) -> Self {
        (value as u64).into()
    }
}

impl From<i32> for BigInt {
    fn from(value: i32) -> Self {
        (value as i64).into()
    }
}

impl Neg for &BigInt {
    type Output = BigInt;

    fn neg(self) -> BigInt {
        let mut n = self.clone();
        if !n.is_zero() {
            n.negative = !n.negative;
        }
        n
    }
}

impl Neg for BigInt {
    type Output = BigInt;

    fn neg(mut self) -> BigInt {
        if !self.is_zero() {
            self.negative = !self.negative;
        }
        self
    }
}

impl AddAssign<&BigInt> for BigInt {
    fn add_assign(&mut self, other: &BigInt) {
        self.add_shifted(other, 0);
    }
}

impl SubAssign<&BigInt> for BigInt {
    fn sub_assign(&mut self, other: &BigInt) {
        self.sub_shifted(other, 0);
    }
}

impl MulAssign<&BigInt> for BigInt {
    fn mul_assign(&mut self, other: &BigInt) {
        let product = if self.limbs.len().max(other.limbs.len()) > KARATSUBA_CUTOFF {
            self.mul_karatsuba(other)
        } else {
            self.mul_schoolbook(other)
        };
        *self = product;
    }
}

impl DivAssign<&BigInt> for BigInt {
    fn div_assign(&mut self, other: &BigInt) {
        match self.div_rem(other) {
            Ok((q, _)) => *self = q,
            Err(_) => panic!("division by zero"),
        }
    }
}

impl RemAssign<&BigInt> for BigInt {
    fn rem_assign(&mut self, other: &BigInt) {
        match self.div_rem(other) {
            Ok((_, r)) => *self = r,
            Err(_) => panic!("division by zero"),
        }
    }
}

impl BitAndAssign<&BigInt> for BigInt {
    fn bitand_assign(&mut self, other: &BigInt) {
        let min_len = self.limbs.len().min(other.limbs.len());
        self.limbs.truncate(min_len);
        for i in 0..min_len {
            self.limbs[i] &= other.limbs[i];
        }
        self.normalize();
    }
}

impl BitOrAssign<&BigInt> for BigInt {
    fn bitor_assign(&mut self, other: &BigInt) {
        let max_len = self.limbs.len().max(other.limbs.len());
        self.limbs.resize(max_len, 0);
        for i in 0..other.limbs.len() {
            self.limbs[i] |= other.limbs[i];
        }
        self.normalize();
    }
}

impl BitXorAssign<&BigInt> for BigInt {
    fn bitxor_assign(&mut self, other: &BigInt) {
        let max_len = self.limbs.len().max(other.limbs.len());
        self.limbs.resize(max_len, 0);
        for i in 0..other.limbs.len() {
            self.limbs[i] ^= other.limbs[i];
        }
        self.normalize();
    }
}

impl Not for &BigInt {
    type Output = BigInt;

    fn not(self) -> BigInt {
        let mut n = self.clone();
        for limb in n.limbs.iter_mut() {
            *limb = !*limb;
        }
        n.normalize();
        n
    }
}

impl ShlAssign<usize> for BigInt {
    fn shl_assign(&mut self, shift: usize) {
        if shift == 0 || self.is_zero() {
            return;
        }
        let limb_shift = shift / 32;
        let bit_shift = shift % 32;
        if limb_shift > 0 {
            let mut shifted = ResVec::with_capacity_in(
                self.limbs.len() + limb_shift,
                self.resource().clone(),
            );
            shifted.resize(limb_shift, 0u32);
            shifted.extend_from_slice(&self.limbs);
            self.limbs = shifted;
        }
        if bit_shift > 0 {
            let mut carry = 0u32;
            for limb in self.limbs.iter_mut() {
                let value = (*limb as u64) << bit_shift | carry as u64;
                *limb = value as u32;
                carry = (value >> 32) as u32;
            }
            if carry > 0 {
                self.limbs.push(carry);
            }
        }
        self.normalize();
    }
}

impl ShrAssign<usize> for BigInt {
    fn shr_assign(&mut self, shift: usize) {
        if shift == 0 || self.is_zero() {
            return;
        }
        let limb_shift = shift / 32;
        let bit_shift = shift % 32;
        if limb_shift >= self.limbs.len() {
            self.set_zero();
            return;
        }
        if limb_shift > 0 {
            let kept = ResVec::from_slice_in(&self.limbs[limb_shift..], self.resource().clone());
            self.limbs = kept;
        }
        if bit_shift > 0 {
            let mut carry = 0u32;
            for i in (0..self.limbs.len()).rev() {
                let value = (carry as u64) << 32 | self.limbs[i] as u64;
                self.limbs[i] = (value >> bit_shift) as u32;
                carry = (value & ((1 << bit_shift) - 1)) as u32;
            }
        }
        self.normalize();
    }
}

macro_rules! forward_binop {
    ($trait:ident, $method:ident, $assign_trait:ident, $assign_method:ident) => {
        impl $trait<&BigInt> for &BigInt {
            type Output = BigInt;

            fn $method(self, other: &BigInt) -> BigInt {
                let mut result = self.clone();
                $assign_trait::$assign_method(&mut result, other);
                result
            }
        }

        impl $trait for BigInt {
            type Output = BigInt;

            fn $method(mut self, other: BigInt) -> BigInt {
                $assign_trait::$assign_method(&mut self, &other);
                self
            }
        }

        impl $trait<&BigInt> for BigInt {
            type Output = BigInt;

            fn $method(mut self, other: &BigInt) -> BigInt {
                $assign_trait::$assign_method(&mut self, other);
                self
            }
        }

        impl $assign_trait for BigInt {
            fn $assign_method(&mut self, other: BigInt) {
                $assign_trait::$assign_method(self, &other);
            }
        }
    };
}

forward_binop!(Add, add, AddAssign, add_assign);
forward_binop!(Sub, sub, SubAssign, sub_assign);
forward_binop!(Mul, mul, MulAssign, mul_assign);
forward_binop!(Div, div, DivAssign, div_assign);
forward_binop!(Rem, rem, RemAssign, rem_assign);
forward_binop!(BitAnd, bitand, BitAndAssign, bitand_assign);
forward_binop!(BitOr, bitor, BitOrAssign, bitor_assign);
forward_binop!(BitXor, bitxor, BitXorAssign, bitxor_assign);

impl Shl<usize> for &BigInt {
    type Output = BigInt;

    fn shl(self, shift: usize) -> BigInt {
        let mut n = self.clone();
        n <<= shift;
        n
    }
}

impl Shr<usize> for &BigInt {
    type Output = BigInt;

    fn shr(self, shift: usize) -> BigInt {
        let mut n = self.clone();
        n >>= shift;
        n
    }
}

impl Shl<usize> for BigInt {
    type Output = BigInt;

    fn shl(mut self, shift: usize) -> BigInt {
        self <<= shift;
        self
    }
}

impl Shr<usize> for BigInt {
    type Output = BigInt;

    fn shr(mut self, shift: usize) -> BigInt {
        self >>= shift;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_xoshiro::Xoshiro256PlusPlus;

    fn big(v: i128) -> BigInt {
        BigInt::from_str_radix(&v.to_string(), 10).unwrap()
    }

    fn as_i128(n: &BigInt) -> i128 {
        n.to_string_radix10().parse().unwrap()
    }

    #[test]
    fn parse_and_format_round_trip() {
        for s in [
            "0",
            "1",
            "-1",
            "4294967295",
            "4294967296",
            "-340282366920938463463374607431768211455",
            "12345678901234567890",
        ] {
            let n = BigInt::from_str_radix(s, 10).unwrap();
            assert_eq!(n.to_string(), s);
        }
        // leading zeros and sign prefixes parse but print canonically
        assert_eq!(BigInt::from_str_radix("+0007", 10).unwrap().to_string(), "7");
        assert_eq!(BigInt::from_str_radix("-000", 10).unwrap().to_string(), "0");
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(BigInt::from_str_radix("12x4", 10).is_err());
        assert!(BigInt::from_str_radix("", 10).is_err());
        assert!(BigInt::from_str_radix("-", 10).is_err());
        assert!(BigInt::from_str_radix("19", 9).is_err());
        assert!(BigInt::from_str_radix("10", 1).is_err());
        assert!(BigInt::from_str_radix("10", 37).is_err());
    }

    #[test]
    fn radix_parsing() {
        assert_eq!(BigInt::from_str_radix("ff", 16).unwrap(), big(255));
        assert_eq!(BigInt::from_str_radix("FF", 16).unwrap(), big(255));
        assert_eq!(BigInt::from_str_radix("-101", 2).unwrap(), big(-5));
        assert_eq!(BigInt::from_str_radix("zz", 36).unwrap(), big(35 * 36 + 35));
    }

    #[test]
    fn add_sub_match_reference() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(0xadd50b);
        for _ in 0..500 {
            let a = rng.gen_range(-(1i128 << 90)..(1i128 << 90));
            let b = rng.gen_range(-(1i128 << 90)..(1i128 << 90));
            assert_eq!(as_i128(&(big(a) + big(b))), a + b);
            assert_eq!(as_i128(&(big(a) - big(b))), a - b);
        }
    }

    #[test]
    fn identity_properties() {
        let x = big(1234567890123456789);
        assert_eq!(&x + &big(0), x);
        assert_eq!(&x * &big(1), x);
    }

    #[test]
    fn mul_div_match_reference() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(0xd1a1de);
        for _ in 0..300 {
            let a = rng.gen_range(-(1i128 << 60)..(1i128 << 60));
            let b = rng.gen_range(-(1i128 << 60)..(1i128 << 60));
            assert_eq!(as_i128(&(big(a) * big(b))), a * b);
            if b != 0 {
                let (q, r) = big(a).div_rem(&big(b)).unwrap();
                assert_eq!(as_i128(&q), a / b);
                assert_eq!(as_i128(&r), a % b);
            }
        }
    }

    #[test]
    fn division_identity_holds() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(0x1de0717);
        for _ in 0..200 {
            let a_limbs = rng.gen_range(1..20);
            let b_limbs = rng.gen_range(1..10);
            let a = random_bigint(&mut rng, a_limbs);
            let b = random_bigint(&mut rng, b_limbs);
            if b.is_zero() {
                continue;
            }
            let (q, r) = a.div_rem(&b).unwrap();
            assert_eq!(&q * &b + &r, a);
            assert!(r.abs() < b.abs());
        }
    }

    #[test]
    fn division_by_zero_is_domain_error() {
        assert!(matches!(
            big(5).div_rem(&big(0)),
            Err(Error::Domain(_))
        ));
    }

    fn random_bigint(rng: &mut impl Rng, limbs: usize) -> BigInt {
        let mut words: Vec<u32> = (0..limbs).map(|_| rng.gen()).collect();
        if rng.gen_bool(0.2) {
            *words.last_mut().unwrap() = 0;
        }
        BigInt::from_limbs_in(&words, rng.gen_bool(0.5), ResourceHandle::default())
    }

    #[test]
    fn karatsuba_matches_schoolbook() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(0xca8a250ba);
        for _ in 0..40 {
            let a_len = rng.gen_range(1..200);
            let a = random_bigint(&mut rng, a_len);
            let b_len = rng.gen_range(1..200);
            let b = random_bigint(&mut rng, b_len);
            assert_eq!(a.mul_karatsuba(&b), a.mul_schoolbook(&b));
        }
    }

    #[test]
    fn shifts_match_reference() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(0x5b1f7);
        for _ in 0..300 {
            let a = rng.gen_range(0u128..(1u128 << 100));
            let s = rng.gen_range(0usize..70);
            let n = BigInt::from_str_radix(&a.to_string(), 10).unwrap();
            if a.checked_shl(s as u32).map_or(false, |v| v >> s == a) {
                assert_eq!((&n << s).to_string(), (a << s).to_string());
            }
            assert_eq!((&n >> s).to_string(), (a >> s).to_string());
        }
    }

    #[test]
    fn bitwise_ops_match_reference() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(0xb17015e);
        for _ in 0..300 {
            let a = rng.gen_range(0u128..(1u128 << 100));
            let b = rng.gen_range(0u128..(1u128 << 100));
            let (x, y) = (
                BigInt::from_str_radix(&a.to_string(), 10).unwrap(),
                BigInt::from_str_radix(&b.to_string(), 10).unwrap(),
            );
            assert_eq!((&x & &y).to_string(), (a & b).to_string());
            assert_eq!((&x | &y).to_string(), (a | b).to_string());
            assert_eq!((&x ^ &y).to_string(), (a ^ b).to_string());
        }
    }

    #[test]
    fn comparison_orders_by_sign_then_magnitude() {
        let values = [-1000i64, -5, -1, 0, 1, 5, 1000];
        for &a in &values {
            for &b in &values {
                assert_eq!(
                    BigInt::from(a).cmp(&BigInt::from(b)),
                    a.cmp(&b),
                    "{a} vs {b}"
                );
            }
        }
    }

    #[test]
    fn string_round_trip_random() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(0x570106);
        for _ in 0..100 {
            let n_len = rng.gen_range(1..30);
            let n = random_bigint(&mut rng, n_len);
            let s = n.to_string();
            assert_eq!(BigInt::from_str_radix(&s, 10).unwrap(), n);
        }
    }

    #[test]
    fn shifted_accumulation() {
        // add_shifted is the multiplication reduction primitive
        let mut acc = big(0);
        acc.add_shifted(&big(7), 2);
        // 7 · (2^32)^2
        assert_eq!(acc, big(7) << 64);
        acc.sub_shifted(&big(7), 2);
        assert!(acc.is_zero());
    }
}
