//! Text charts for the Markdown report.

const SPARK_CHARS: &[char] = &['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];
const BAR_CHAR: char = '█';

/// Render values as a one-line sparkline, scaled to the largest value.
pub fn sparkline(values: &[f64]) -> String {
    let max = values.iter().cloned().fold(0.0_f64, f64::max);
    if max <= 0.0 {
        return SPARK_CHARS[0].to_string().repeat(values.len());
    }

    values
        .iter()
        .map(|&v| {
            let normalized = (v.max(0.0) / max).min(1.0);
            let idx = (normalized * (SPARK_CHARS.len() - 1) as f64).round() as usize;
            SPARK_CHARS[idx.min(SPARK_CHARS.len() - 1)]
        })
        .collect()
}

/// Horizontal bar chart, one labelled row per value, inside a code fence.
///
/// Bars are scaled so the largest value spans `width` characters.
pub fn bar_chart(rows: &[(String, f64)], width: usize) -> String {
    if rows.is_empty() {
        return String::new();
    }

    let label_width = rows.iter().map(|(l, _)| l.chars().count()).max().unwrap_or(0);
    let max = rows.iter().map(|(_, v)| *v).fold(0.0_f64, f64::max);

    let mut chart = String::from("```text\n");
    for (label, value) in rows {
        let len = if max > 0.0 {
            ((value.max(0.0) / max) * width as f64).round() as usize
        } else {
            0
        };
        chart.push_str(&format!(
            "{:<lw$} | {} {}\n",
            label,
            BAR_CHAR.to_string().repeat(len),
            format_number(*value),
            lw = label_width
        ));
    }
    chart.push_str("```\n\n");
    chart
}

/// Integers without decimals, everything else with one.
fn format_number(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{:.0}", value)
    } else {
        format!("{:.1}", value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sparkline_scaling() {
        let line = sparkline(&[0.0, 50.0, 100.0]);
        assert_eq!(line.chars().count(), 3);
        assert!(line.starts_with('▁'));
        assert!(line.ends_with('█'));
    }

    #[test]
    fn test_sparkline_all_zero() {
        assert_eq!(sparkline(&[0.0, 0.0]), "▁▁");
        assert_eq!(sparkline(&[]), "");
    }

    #[test]
    fn test_bar_chart() {
        let rows = vec![("blood".to_string(), 10.0), ("tissue".to_string(), 5.0)];
        let chart = bar_chart(&rows, 10);

        assert!(chart.starts_with("```text\n"));
        assert!(chart.contains(&format!("blood  | {} 10", "█".repeat(10))));
        assert!(chart.contains(&format!("tissue | {} 5", "█".repeat(5))));
    }

    #[test]
    fn test_bar_chart_empty() {
        assert_eq!(bar_chart(&[], 10), "");
    }
}
