use uom::si::f64::HeatTransfer;

/// `1 / (1/a + 1/b + ...)` for two or more values. Applied to heat transfer
/// coefficients it gives the coefficient of the layers stacked in series.
macro_rules! reciprocal_sum {
    ($head:expr, $( $tail:expr ),+) => {
        ($head.recip() $(+ $tail.recip())*).recip()
    }
}
pub(crate) use reciprocal_sum;

/// Implement conversion between a unit-only enum and the keywords IDF uses for it.
/// Parsing is case insensitive, as it is in EnergyPlus.
macro_rules! idf_keywords {
    ($type:ty { $( $variant:ident => $keyword:literal ),+ $(,)? }) => {
        impl $type {
            pub fn idf_keyword(&self) -> &'static str {
                match self {
                    $( Self::$variant => $keyword, )+
                }
            }

            pub fn from_idf_keyword(text: &str) -> Option<Self> {
                let text = text.trim();
                $(
                    if text.eq_ignore_ascii_case($keyword) {
                        return Some(Self::$variant);
                    }
                )+
                None
            }
        }
    };
}
pub(crate) use idf_keywords;

/// Overall heat transfer coefficient of layers connected in series.
/// Returns `None` for an empty stack.
pub fn series_heat_transfer<I>(layers: I) -> Option<HeatTransfer>
where
    I: IntoIterator<Item = HeatTransfer>,
{
    layers.into_iter().reduce(|a, b| reciprocal_sum!(a, b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_ulps_eq;
    use proptest::prelude::prop;
    use test_strategy::proptest;
    use uom::si::heat_transfer::watt_per_square_meter_kelvin;

    #[test]
    fn reciprocal_sum_four_identical() {
        assert_eq!(reciprocal_sum!(2.0f64, 2.0f64, 2.0f64, 2.0f64), 0.5);
    }

    #[test]
    fn series_of_nothing() {
        assert_eq!(series_heat_transfer(Vec::new()), None);
    }

    #[test]
    fn series_of_two_layers() {
        let u = series_heat_transfer([
            HeatTransfer::new::<watt_per_square_meter_kelvin>(2.0),
            HeatTransfer::new::<watt_per_square_meter_kelvin>(2.0),
        ])
        .unwrap();
        assert_ulps_eq!(u.get::<watt_per_square_meter_kelvin>(), 1.0);
    }

    #[proptest]
    fn series_pairwise_vs_reciprocal_sum(
        #[strategy(prop::collection::vec(1e-3f64..1e3, 1..100))] values: Vec<f64>,
    ) {
        let pairwise = series_heat_transfer(
            values
                .iter()
                .map(|&v| HeatTransfer::new::<watt_per_square_meter_kelvin>(v)),
        )
        .unwrap();
        let expected = values.iter().map(|x| x.recip()).sum::<f64>().recip();
        approx::assert_relative_eq!(
            pairwise.get::<watt_per_square_meter_kelvin>(),
            expected,
            max_relative = 1e-9
        );
    }
}
