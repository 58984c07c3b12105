use crate::big_int::BigInt;
use crate::memory::ResourceHandle;
use crate::{Error, Result};
use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, AddAssign, Div, DivAssign, Mul, MulAssign, Neg, Sub, SubAssign};
use std::str::FromStr;

pub fn gcd(a: &BigInt, b: &BigInt) -> BigInt {
    let mut a = a.abs();
    let mut b = b.abs();
    while !b.is_zero() {
        let r = &a % &b;
        a = b;
        b = r;
    }
    a
}

/// Reduced rational: non-negative numerator, sign carried on the
/// denominator. Canonical after every mutation: `gcd(num, |den|) = 1`,
/// `den != 0`, zero is `0/1`.
#[derive(Clone, PartialEq, Eq)]
pub struct Fraction {
    numerator: BigInt,
    denominator: BigInt,
}

impl Fraction {
    pub fn new(numerator: BigInt, denominator: BigInt) -> Result<Self> {
        if denominator.is_zero() {
            return Err(Error::InvalidArgument("denominator cannot be zero"));
        }
        let mut f = Fraction {
            numerator,
            denominator,
        };
        f.reduce();
        Ok(f)
    }

    pub fn from_i64(numerator: i64, denominator: i64) -> Result<Self> {
        Self::new(BigInt::from(numerator), BigInt::from(denominator))
    }

    pub fn zero_in(resource: ResourceHandle) -> Self {
        Fraction {
            numerator: BigInt::new_in(resource.clone()),
            denominator: BigInt::from_u64_in(1, resource),
        }
    }

    pub fn numerator(&self) -> &BigInt {
        &self.numerator
    }

    pub fn denominator(&self) -> &BigInt {
        &self.denominator
    }

    pub fn is_zero(&self) -> bool {
        self.numerator.is_zero()
    }

    pub fn is_negative(&self) -> bool {
        self.denominator.is_negative()
    }

    pub fn abs(&self) -> Fraction {
        if self.is_negative() {
            -self.clone()
        } else {
            self.clone()
        }
    }

    pub fn to_f64(&self) -> f64 {
        let n: f64 = self.numerator.to_string().parse().unwrap_or(f64::NAN);
        let d: f64 = self.denominator.to_string().parse().unwrap_or(f64::NAN);
        n / d
    }

    /// Restores the canonical form; the denominator must be non-zero.
    fn reduce(&mut self) {
        assert!(!self.denominator.is_zero(), "division by zero");
        if self.numerator.is_zero() {
            self.denominator = BigInt::from_u64_in(1, self.resource());
            return;
        }
        if self.numerator.is_negative() {
            self.numerator = self.numerator.abs();
            self.denominator = -&self.denominator;
        }
        let divisor = gcd(&self.numerator, &self.denominator);
        self.numerator = &self.numerator / &divisor;
        self.denominator = &self.denominator / &divisor;
    }

    fn resource(&self) -> ResourceHandle {
        self.numerator.resource().clone()
    }

    /// Small rational over this fraction's memory resource.
    fn small(&self, numerator: i64, denominator: i64) -> Fraction {
        debug_assert!(denominator != 0);
        let mut f = Fraction {
            numerator: BigInt::from_i64_in(numerator, self.resource()),
            denominator: BigInt::from_i64_in(denominator, self.resource()),
        };
        f.reduce();
        f
    }

    pub fn checked_div(&self, other: &Fraction) -> Result<Fraction> {
        if other.is_zero() {
            return Err(Error::Domain("division by zero"));
        }
        Ok(self / other)
    }

    fn check_epsilon(&self, epsilon: &Fraction) -> Result<()> {
        if epsilon.is_zero() || epsilon.is_negative() {
            return Err(Error::InvalidArgument("epsilon must be positive"));
        }
        Ok(())
    }

    // region series transcendentals

    /// Maclaurin series, truncated when the next term's magnitude drops to
    /// `epsilon`.
    pub fn sin(&self, epsilon: &Fraction) -> Result<Fraction> {
        self.check_epsilon(epsilon)?;
        let mut result = self.small(0, 1);
        let mut term = self.clone();
        let minus_x2 = -(self * self);
        let mut n = 1i64;
        while term.abs() > *epsilon {
            result += &term;
            term = &term * &minus_x2;
            term /= self.small(2 * n * (2 * n + 1), 1);
            n += 1;
        }
        Ok(result)
    }

    pub fn cos(&self, epsilon: &Fraction) -> Result<Fraction> {
        self.check_epsilon(epsilon)?;
        let mut result = self.small(1, 1);
        let mut term = self.small(1, 1);
        let minus_x2 = -(self * self);
        let mut n = 1i64;
        loop {
            term = &term * &minus_x2;
            term /= self.small((2 * n - 1) * 2 * n, 1);
            if term.abs() <= *epsilon {
                break;
            }
            result += &term;
            n += 1;
        }
        Ok(result)
    }

    pub fn arcsin(&self, epsilon: &Fraction) -> Result<Fraction> {
        self.check_epsilon(epsilon)?;
        if self.abs() > self.small(1, 1) {
            return Err(Error::Domain("arcsin is undefined for |x| > 1"));
        }
        let mut result = self.small(0, 1);
        let mut term = self.clone();
        let x2 = self * self;
        let mut n = 1i64;
        while term.abs() > *epsilon {
            result += &term;
            // ((2n-1)!! / (2n)!!) · x^(2n+1) / (2n+1), built incrementally
            let coeff = self.small((2 * n - 1) * (2 * n - 1), 2 * n * (2 * n + 1));
            term = &(&term * &x2) * &coeff;
            n += 1;
        }
        Ok(result)
    }

    pub fn arccos(&self, epsilon: &Fraction) -> Result<Fraction> {
        if self.abs() > self.small(1, 1) {
            return Err(Error::Domain("arccos is undefined for |x| > 1"));
        }
        Ok(self.half_pi(epsilon)? - self.arcsin(epsilon)?)
    }

    /// `π/2` as `3·arcsin(1/2)`.
    fn half_pi(&self, epsilon: &Fraction) -> Result<Fraction> {
        Ok(self.small(1, 2).arcsin(epsilon)? * self.small(3, 1))
    }

    pub fn arctg(&self, epsilon: &Fraction) -> Result<Fraction> {
        self.check_epsilon(epsilon)?;
        if self.is_negative() {
            return Ok(-((-self.clone()).arctg(epsilon)?));
        }
        if *self > self.small(1, 1) {
            // reduce |x| > 1 through arctg(1/x)
            let inv = self.small(1, 1) / self.clone();
            return Ok(self.half_pi(epsilon)? - inv.arctg(epsilon)?);
        }
        let mut result = self.small(0, 1);
        let mut power = self.clone();
        let x2 = self * self;
        let mut k = 0i64;
        loop {
            let delta = &power / &self.small(2 * k + 1, 1);
            if delta.abs() <= *epsilon {
                break;
            }
            if k % 2 == 0 {
                result += &delta;
            } else {
                result -= &delta;
            }
            power = &power * &x2;
            k += 1;
        }
        Ok(result)
    }

    pub fn arcctg(&self, epsilon: &Fraction) -> Result<Fraction> {
        if self.is_zero() {
            return Err(Error::Domain("arcctg is undefined for x = 0"));
        }
        Ok(self.half_pi(epsilon)? - self.arctg(epsilon)?)
    }

    pub fn tg(&self, epsilon: &Fraction) -> Result<Fraction> {
        self.check_epsilon(epsilon)?;
        let tight = epsilon * epsilon;
        let cosine = self.cos(&tight)?;
        if cosine.is_zero() {
            return Err(Error::Domain("tangent undefined"));
        }
        Ok(self.sin(&tight)? / cosine)
    }

    pub fn ctg(&self, epsilon: &Fraction) -> Result<Fraction> {
        self.check_epsilon(epsilon)?;
        let tight = epsilon * epsilon;
        let sine = self.sin(&tight)?;
        if sine.is_zero() {
            return Err(Error::Domain("cotangent undefined"));
        }
        Ok(self.cos(&tight)? / sine)
    }

    pub fn sec(&self, epsilon: &Fraction) -> Result<Fraction> {
        let cosine = self.cos(epsilon)?;
        if cosine.is_zero() {
            return Err(Error::Domain("secant undefined"));
        }
        Ok(self.small(1, 1) / cosine)
    }

    pub fn cosec(&self, epsilon: &Fraction) -> Result<Fraction> {
        let sine = self.sin(epsilon)?;
        if sine.is_zero() {
            return Err(Error::Domain("cosecant undefined"));
        }
        Ok(self.small(1, 1) / sine)
    }

    pub fn arcsec(&self, epsilon: &Fraction) -> Result<Fraction> {
        if self.is_zero() {
            return Err(Error::Domain("arcsec is undefined for x = 0"));
        }
        let inv = self.small(1, 1) / self.clone();
        if inv.abs() > self.small(1, 1) {
            return Err(Error::Domain("arcsec is undefined for |x| < 1"));
        }
        inv.arccos(epsilon)
    }

    pub fn arccosec(&self, epsilon: &Fraction) -> Result<Fraction> {
        if self.is_zero() {
            return Err(Error::Domain("arccosec is undefined for x = 0"));
        }
        let inv = self.small(1, 1) / self.clone();
        if inv.abs() > self.small(1, 1) {
            return Err(Error::Domain("arccosec is undefined for |x| < 1"));
        }
        inv.arcsin(epsilon)
    }

    // endregion series transcendentals

    /// Integer power by square-and-multiply.
    pub fn pow(&self, mut degree: u64) -> Fraction {
        let mut base = self.clone();
        let mut result = self.small(1, 1);
        while degree > 0 {
            if degree & 1 == 1 {
                result *= &base;
            }
            base = &base * &base;
            degree >>= 1;
        }
        result
    }

    /// Newton–Raphson `degree`-th root with initial guess `self / degree`.
    pub fn root(&self, degree: u64, epsilon: &Fraction) -> Result<Fraction> {
        if degree == 0 {
            return Err(Error::InvalidArgument("root degree cannot be zero"));
        }
        self.check_epsilon(epsilon)?;
        if degree == 1 {
            return Ok(self.clone());
        }
        if self.is_negative() && degree % 2 == 0 {
            return Err(Error::Domain("even root of a negative number"));
        }
        if self.is_zero() {
            return Ok(self.small(0, 1));
        }
        let target = self.abs();
        let mut guess = &target / &self.small(degree as i64, 1);
        if guess.is_zero() {
            guess = self.small(1, 1);
        }
        loop {
            let prev = guess.clone();
            let power = prev.pow(degree - 1);
            guess = (self.small(degree as i64 - 1, 1) * &prev + &target / &power)
                / self.small(degree as i64, 1);
            if (&guess - &prev).abs() <= *epsilon {
                break;
            }
        }
        if self.is_negative() {
            guess = -guess;
        }
        Ok(guess)
    }

    /// `ln x = 2·Σ y^(2k+1)/(2k+1)` with `y = (x−1)/(x+1)`, for `x > 0`.
    pub fn ln(&self, epsilon: &Fraction) -> Result<Fraction> {
        self.check_epsilon(epsilon)?;
        if self.is_negative() || self.is_zero() {
            return Err(Error::Domain("logarithm of a non-positive number"));
        }
        let one = self.small(1, 1);
        let y = (self - &one) / (self + &one);
        let y2 = &y * &y;
        let mut term = y.clone();
        let mut sum = y;
        let mut denominator = 1i64;
        loop {
            term = &term * &y2;
            denominator += 2;
            let delta = &term / &self.small(denominator, 1);
            if delta.abs() <= *epsilon {
                break;
            }
            sum += &delta;
        }
        Ok(sum * self.small(2, 1))
    }

    pub fn log2(&self, epsilon: &Fraction) -> Result<Fraction> {
        Ok(self.ln(epsilon)? / self.small(2, 1).ln(epsilon)?)
    }

    pub fn lg(&self, epsilon: &Fraction) -> Result<Fraction> {
        Ok(self.ln(epsilon)? / self.small(10, 1).ln(epsilon)?)
    }
}

impl Ord for Fraction {
    fn cmp(&self, other: &Self) -> Ordering {
        let self_neg = self.is_negative();
        let other_neg = other.is_negative();
        if self_neg != other_neg {
            return if self_neg {
                Ordering::Less
            } else {
                Ordering::Greater
            };
        }
        let lhs = &self.numerator * &other.denominator.abs();
        let rhs = &other.numerator * &self.denominator.abs();
        if self_neg {
            lhs.cmp(&rhs).reverse()
        } else {
            lhs.cmp(&rhs)
        }
    }
}

impl PartialOrd for Fraction {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Fraction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_negative() {
            write!(f, "-")?;
        }
        write!(f, "{}/{}", self.numerator, self.denominator.abs())
    }
}

impl fmt::Debug for Fraction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl FromStr for Fraction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (num, den) = match s.split_once('/') {
            Some((n, d)) => (
                BigInt::from_str_radix(n, 10)?,
                BigInt::from_str_radix(d, 10)?,
            ),
            None => (BigInt::from_str_radix(s, 10)?, BigInt::from(1u32)),
        };
        Fraction::new(num, den)
    }
}

impl Neg for Fraction {
    type Output = Fraction;

    fn neg(mut self) -> Fraction {
        self.denominator = -self.denominator;
        self.reduce();
        self
    }
}

impl Neg for &Fraction {
    type Output = Fraction;

    fn neg(self) -> Fraction {
        -self.clone()
    }
}

impl AddAssign<&Fraction> for Fraction {
    fn add_assign(&mut self, other: &Fraction) {
        self.numerator = &self.numerator * &other.denominator + &self.denominator * &other.numerator;
        self.denominator = &self.denominator * &other.denominator;
        self.reduce();
    }
}

impl SubAssign<&Fraction> for Fraction {
    fn sub_assign(&mut self, other: &Fraction) {
        self.numerator = &self.numerator * &other.denominator - &self.denominator * &other.numerator;
        self.denominator = &self.denominator * &other.denominator;
        self.reduce();
    }
}

impl MulAssign<&Fraction> for Fraction {
    fn mul_assign(&mut self, other: &Fraction) {
        self.numerator = &self.numerator * &other.numerator;
        self.denominator = &self.denominator * &other.denominator;
        self.reduce();
    }
}

impl DivAssign<&Fraction> for Fraction {
    fn div_assign(&mut self, other: &Fraction) {
        self.numerator = &self.numerator * &other.denominator.abs();
        self.denominator = if other.denominator.is_negative() {
            -(&self.denominator * &other.numerator)
        } else {
            &self.denominator * &other.numerator
        };
        self.reduce();
    }
}

macro_rules! forward_frac_binop {
    ($trait:ident, $method:ident, $assign_trait:ident, $assign_method:ident) => {
        impl $trait<&Fraction> for &Fraction {
            type Output = Fraction;

            fn $method(self, other: &Fraction) -> Fraction {
                let mut result = self.clone();
                $assign_trait::$assign_method(&mut result, other);
                result
            }
        }

        impl $trait for Fraction {
            type Output = Fraction;

            fn $method(mut self, other: Fraction) -> Fraction {
                $assign_trait::$assign_method(&mut self, &other);
                self
            }
        }

        impl $trait<&Fraction> for Fraction {
            type Output = Fraction;

            fn $method(mut self, other: &Fraction) -> Fraction {
                $assign_trait::$assign_method(&mut self, other);
                self
            }
        }

        impl $trait<Fraction> for &Fraction {
            type Output = Fraction;

            fn $method(self, other: Fraction) -> Fraction {
                let mut result = self.clone();
                $assign_trait::$assign_method(&mut result, &other);
                result
            }
        }

        impl $assign_trait for Fraction {
            fn $assign_method(&mut self, other: Fraction) {
                $assign_trait::$assign_method(self, &other);
            }
        }
    };
}

forward_frac_binop!(Add, add, AddAssign, add_assign);
forward_frac_binop!(Sub, sub, SubAssign, sub_assign);
forward_frac_binop!(Mul, mul, MulAssign, mul_assign);
forward_frac_binop!(Div, div, DivAssign, div_assign);
