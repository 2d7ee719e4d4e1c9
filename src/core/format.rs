use super::types::Frequency;

/// Two decimals with thousands separators, e.g. `-12,345.67`. No currency symbol.
pub fn format_money(value: f64) -> String {
    let rounded = (value * 100.0).round() / 100.0;
    let sign = if rounded < 0.0 { "-" } else { "" };
    let fixed = format!("{:.2}", rounded.abs());
    let (whole, cents) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, digit) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    format!("{sign}{grouped}.{cents}")
}

/// Fraction in, percent out: `0.0725` -> `7.25%`.
pub fn format_percent(fraction: f64) -> String {
    format!("{:.2}%", fraction * 100.0)
}

pub fn format_periods(periods: u32, frequency: Frequency) -> String {
    if frequency != Frequency::Monthly {
        let unit = match frequency {
            Frequency::Annually => "year",
            Frequency::Quarterly => "quarter",
            Frequency::SemiMonthly => "half-month",
            Frequency::Biweekly => "fortnight",
            Frequency::Weekly => "week",
            Frequency::Daily => "day",
            Frequency::Monthly => "month",
        };
        return plural(periods, unit);
    }
    match (periods / 12, periods % 12) {
        (0, months) => plural(months, "month"),
        (years, 0) => plural(years, "year"),
        (years, months) => format!("{} {}", plural(years, "year"), plural(months, "month")),
    }
}

pub fn format_years(years: f64) -> String {
    format!("{years:.1} years")
}

fn plural(count: u32, unit: &str) -> String {
    if count == 1 {
        format!("1 {unit}")
    } else {
        format!("{count} {unit}s")
    }
}
