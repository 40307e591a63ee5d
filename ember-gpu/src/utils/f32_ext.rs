pub trait F32Ext
where
    Self: Sized,
{
    fn saturate(self) -> Self;

    /// Returns `self` if it's a finite, positive number, zero otherwise.
    fn positive_or_zero(self) -> Self;
}

impl F32Ext for f32 {
    fn saturate(self) -> Self {
        self.clamp(0.0, 1.0)
    }

    fn positive_or_zero(self) -> Self {
        if self.is_finite() && self > 0.0 {
            self
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positive_or_zero() {
        assert_eq!(1.5, 1.5f32.positive_or_zero());
        assert_eq!(0.0, (-1.5f32).positive_or_zero());
        assert_eq!(0.0, f32::NAN.positive_or_zero());
        assert_eq!(0.0, f32::INFINITY.positive_or_zero());
    }
}
