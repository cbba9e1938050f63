use autoreport_format::{FormatSpec, format_value};
use autoreport_model::Value;
use proptest::prelude::*;

fn render(value: f64, spec: &str) -> String {
    let spec = FormatSpec::parse(spec).expect("valid spec");
    format_value(&Value::Number(value), &spec).expect("numbers format")
}

proptest! {
    #[test]
    fn grouping_only_inserts_commas(value in -1.0e12f64..1.0e12) {
        let plain = render(value, ".2");
        let grouped = render(value, ",.2");
        prop_assert_eq!(grouped.replace(',', ""), plain);
    }

    #[test]
    fn fixed_precision_has_exact_decimals(value in -1.0e9f64..1.0e9, precision in 0usize..6) {
        let text = render(value, &format!(".{precision}"));
        let decimals = text.split_once('.').map_or(0, |(_, fraction)| fraction.len());
        prop_assert_eq!(decimals, precision);
    }

    #[test]
    fn currency_sign_precedes_symbol(value in -1.0e9f64..1.0e9) {
        let text = render(value, "$");
        let expected_prefix = if text.starts_with('-') { "-$" } else { "$" };
        prop_assert!(text.starts_with(expected_prefix));
        prop_assert_eq!(text.starts_with('-'), value < 0.0 && value.abs() >= 0.005);
    }

    #[test]
    fn explicit_sign_never_leaves_values_unsigned(value in -1.0e6f64..1.0e6) {
        let text = render(value, "+-.1");
        prop_assert!(text.starts_with('+') || text.starts_with('-'));
    }
}

#[test]
fn inline_spec_round_trips_its_text() {
    let spec: FormatSpec = "$,.2; upper".parse().expect("valid spec");
    assert_eq!(spec.to_string(), "$,.2; upper");
}
