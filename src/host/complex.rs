//! Complex numbers for the host value model.
//!
//! The scripting runtime has no native complex type, so complex values
//! are always wrapped as foreign handles; this type backs those handles
//! and the operator emulation layer's complex promotion.

use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Sub};

/// A 64-bit-per-part complex number.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Complex64 {
    pub re: f64,
    pub im: f64,
}

impl Complex64 {
    pub const ZERO: Complex64 = Complex64 { re: 0.0, im: 0.0 };

    pub fn new(re: f64, im: f64) -> Self {
        Complex64 { re, im }
    }

    /// Promote a real number.
    pub fn from_real(re: f64) -> Self {
        Complex64 { re, im: 0.0 }
    }

    pub fn norm(self) -> f64 {
        self.re.hypot(self.im)
    }

    pub fn arg(self) -> f64 {
        self.im.atan2(self.re)
    }

    /// Complex exponentiation via the polar form: `z^w = exp(w ln z)`.
    pub fn powc(self, exp: Complex64) -> Complex64 {
        if self == Complex64::ZERO {
            if exp == Complex64::ZERO {
                return Complex64::from_real(1.0);
            }
            return Complex64::ZERO;
        }
        let (r, theta) = (self.norm(), self.arg());
        let ln_r = r.ln();
        let new_r = (exp.re * ln_r - exp.im * theta).exp();
        let new_theta = exp.im * ln_r + exp.re * theta;
        Complex64::new(new_r * new_theta.cos(), new_r * new_theta.sin())
    }
}

impl Add for Complex64 {
    type Output = Complex64;
    fn add(self, rhs: Complex64) -> Complex64 {
        Complex64::new(self.re + rhs.re, self.im + rhs.im)
    }
}

impl Sub for Complex64 {
    type Output = Complex64;
    fn sub(self, rhs: Complex64) -> Complex64 {
        Complex64::new(self.re - rhs.re, self.im - rhs.im)
    }
}

impl Mul for Complex64 {
    type Output = Complex64;
    fn mul(self, rhs: Complex64) -> Complex64 {
        Complex64::new(
            self.re * rhs.re - self.im * rhs.im,
            self.re * rhs.im + self.im * rhs.re,
        )
    }
}

impl Div for Complex64 {
    type Output = Complex64;
    fn div(self, rhs: Complex64) -> Complex64 {
        let denom = rhs.re * rhs.re + rhs.im * rhs.im;
        Complex64::new(
            (self.re * rhs.re + self.im * rhs.im) / denom,
            (self.im * rhs.re - self.re * rhs.im) / denom,
        )
    }
}

impl Neg for Complex64 {
    type Output = Complex64;
    fn neg(self) -> Complex64 {
        Complex64::new(-self.re, -self.im)
    }
}

impl fmt::Display for Complex64 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.im >= 0.0 {
            write!(f, "({}+{}i)", self.re, self.im)
        } else {
            write!(f, "({}{}i)", self.re, self.im)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arithmetic() {
        let a = Complex64::new(1.0, 2.0);
        let b = Complex64::new(3.0, -1.0);
        assert_eq!(a + b, Complex64::new(4.0, 1.0));
        assert_eq!(a - b, Complex64::new(-2.0, 3.0));
        assert_eq!(a * b, Complex64::new(5.0, 5.0));
        let q = (a * b) / b;
        assert!((q.re - a.re).abs() < 1e-12);
        assert!((q.im - a.im).abs() < 1e-12);
    }

    #[test]
    fn pow_of_i_squared() {
        let i = Complex64::new(0.0, 1.0);
        let sq = i.powc(Complex64::from_real(2.0));
        assert!((sq.re + 1.0).abs() < 1e-12);
        assert!(sq.im.abs() < 1e-12);
    }

    #[test]
    fn display_form() {
        assert_eq!(Complex64::new(3.0, 4.0).to_string(), "(3+4i)");
        assert_eq!(Complex64::new(3.0, -4.0).to_string(), "(3-4i)");
    }
}
