pub fn celsius_to_fahrenheit(celsius: f32) -> f32 {
    celsius * 9.0 / 5.0 + 32.0
}

pub fn fahrenheit_to_celsius(fahrenheit: f32) -> f32 {
    (fahrenheit - 32.0) * 5.0 / 9.0
}

pub fn unit_symbol(use_fahrenheit: bool) -> &'static str {
    if use_fahrenheit {
        "F"
    } else {
        "C"
    }
}

/// Formats a Celsius reading in the display unit, one decimal place.
pub fn display_temperature(celsius: f32, use_fahrenheit: bool) -> String {
    let value = if use_fahrenheit {
        celsius_to_fahrenheit(celsius)
    } else {
        celsius
    };
    format!("{value:.1}°{}", unit_symbol(use_fahrenheit))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_reference_points() {
        assert_eq!(celsius_to_fahrenheit(0.0), 32.0);
        assert_eq!(celsius_to_fahrenheit(100.0), 212.0);
        assert_eq!(fahrenheit_to_celsius(-40.0), -40.0);
        assert!((fahrenheit_to_celsius(celsius_to_fahrenheit(22.3)) - 22.3).abs() < 1e-4);
    }

    #[test]
    fn display_uses_selected_unit() {
        assert_eq!(display_temperature(21.04, false), "21.0°C");
        assert_eq!(display_temperature(25.0, true), "77.0°F");
    }
}
