//! "Getting started" backend: every prompt yields a profile of the dataset.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::{Value as Json, json};

use super::{BackendError, ExecutionBackend, TranslateRequest, Translation};
use crate::engine::dataset::{Dataset, Schema};
use crate::engine::{TABLE_NAME, typed_table};
use crate::engine::table::{Column, Table, Value, stringify_number};
use crate::message::{Component, ComponentConfig, ComponentType, MessageJsonContent};

const PREVIEW_ROWS: usize = 3;
const TOP_VALUES: usize = 5;
const HISTOGRAM_BINS: usize = 10;

#[derive(Debug, Clone, Default)]
pub struct ProfileBackend;

impl ProfileBackend {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ExecutionBackend for ProfileBackend {
    fn name(&self) -> &'static str {
        "profile"
    }

    async fn translate(&self, _req: TranslateRequest<'_>) -> Result<Translation, BackendError> {
        Ok(Translation::Query(format!("SELECT * FROM {TABLE_NAME}")))
    }

    /// Profiles the whole dataset rather than the capped query result.
    fn present(&self, result: &Table, source: Option<(&Dataset, &Schema)>) -> MessageJsonContent {
        match source {
            Some((dataset, schema)) => profile(&typed_table(dataset, schema)),
            None => profile(result),
        }
    }
}

fn config() -> ComponentConfig {
    ComponentConfig::new(true, true)
}

fn number(v: f64) -> Json {
    if v.is_nan() {
        Json::Null
    } else {
        Json::String(stringify_number(v))
    }
}

/// Build the profile content for `table`.
pub fn profile(table: &Table) -> MessageJsonContent {
    let mut content = MessageJsonContent::new("GETTING_STARTED");

    content.push(
        Component::new(ComponentType::Table, "Column Names")
            .with_description(format!("The top {PREVIEW_ROWS} rows of the dataset."))
            .with_config(config())
            .with_data(table.head(PREVIEW_ROWS).to_json_data()),
    );

    let numeric: Vec<&Column> = table.columns.iter().filter(|c| c.is_numeric()).collect();
    if !numeric.is_empty() {
        let names: Vec<&str> = numeric.iter().map(|c| c.name.as_str()).collect();
        let values: Vec<Json> = numeric
            .iter()
            .map(|a| Json::Array(numeric.iter().map(|b| number(correlation(a, b))).collect()))
            .collect();
        content.push(
            Component::new(ComponentType::PlotHeatmap, "Heatmap")
                .with_description("Correlation between the columns.")
                .with_config(config())
                .with_data(json!({"columns": names, "rows": names, "values": values})),
        );
    }

    for col in &table.columns {
        let (categories, counts): (Vec<String>, Vec<Json>) = top_values(col)
            .into_iter()
            .map(|(label, n)| (label, Json::String(n.to_string())))
            .unzip();
        content.push(
            Component::new(ComponentType::PlotBar, format!("Histogram for {}", col.name))
                .with_description(format!("The top {TOP_VALUES} values for {}.", col.name))
                .with_config(config())
                .with_data(json!({"categories": categories, "values": counts})),
        );
    }

    for col in numeric {
        let (density, edges) = histogram(&col.numbers(), HISTOGRAM_BINS);
        content.push(
            Component::new(ComponentType::PlotHist, format!("Histogram for {}", col.name))
                .with_description(format!("The Histogram of {}.", col.name))
                .with_config(config())
                .with_data(json!({
                    "values": density.into_iter().map(number).collect::<Vec<_>>(),
                    "bins": edges.into_iter().map(number).collect::<Vec<_>>(),
                })),
        );
    }

    content
}

/// The most frequent non-null values, most frequent first; ties keep first
/// appearance order.
fn top_values(col: &Column) -> Vec<(String, usize)> {
    let mut order: Vec<String> = Vec::new();
    let mut counts: HashMap<String, usize> = HashMap::new();
    for v in col.values.iter().filter(|v| !v.is_null()) {
        let label = v.label();
        let n = counts.entry(label.clone()).or_insert(0);
        if *n == 0 {
            order.push(label);
        }
        *n += 1;
    }
    let mut ranked: Vec<(String, usize)> = order
        .into_iter()
        .map(|label| {
            let n = counts.get(&label).copied().unwrap_or_default();
            (label, n)
        })
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    ranked.truncate(TOP_VALUES);
    ranked
}

/// Pearson correlation over rows where both columns are non-null.
/// NaN when fewer than two pairs exist or either side is constant.
fn correlation(a: &Column, b: &Column) -> f64 {
    let pairs: Vec<(f64, f64)> = a
        .values
        .iter()
        .zip(&b.values)
        .filter_map(|(x, y)| Some((Value::as_f64(x)?, Value::as_f64(y)?)))
        .collect();
    if pairs.len() < 2 {
        return f64::NAN;
    }
    let n = pairs.len() as f64;
    let mean_x = pairs.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_y = pairs.iter().map(|p| p.1).sum::<f64>() / n;
    let (mut cov, mut var_x, mut var_y) = (0.0, 0.0, 0.0);
    for (x, y) in &pairs {
        let dx = x - mean_x;
        let dy = y - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }
    if var_x == 0.0 || var_y == 0.0 {
        return f64::NAN;
    }
    cov / (var_x * var_y).sqrt()
}

/// Density histogram with `bins` equal-width bins.
///
/// Returns the density per bin and the left edge of each bin.  A constant
/// sample is spread over `[v - 0.5, v + 0.5]`.  The last bin includes its
/// right edge.
fn histogram(values: &[f64], bins: usize) -> (Vec<f64>, Vec<f64>) {
    if values.is_empty() || bins == 0 {
        return (Vec::new(), Vec::new());
    }
    let mut lo = values.iter().copied().fold(f64::INFINITY, f64::min);
    let mut hi = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if lo == hi {
        lo -= 0.5;
        hi += 0.5;
    }
    let width = (hi - lo) / bins as f64;

    let mut counts = vec![0usize; bins];
    for v in values {
        let idx = (((v - lo) / width) as usize).min(bins - 1);
        counts[idx] += 1;
    }

    let total = values.len() as f64;
    let density = counts.iter().map(|c| *c as f64 / (total * width)).collect();
    let edges = (0..bins).map(|i| lo + width * i as f64).collect();
    (density, edges)
}

#[cfg(test)]
mod test {
    use super::*;

    fn numbers(name: &str, values: &[i64]) -> Column {
        Column {
            name: name.into(),
            values: values.iter().map(|v| Value::Int(*v)).collect(),
        }
    }

    #[test]
    fn correlation_of_linear_columns_is_one() {
        let a = numbers("a", &[1, 2, 3, 4]);
        let b = numbers("b", &[2, 4, 6, 8]);
        let c = numbers("c", &[8, 6, 4, 2]);
        assert!((correlation(&a, &b) - 1.0).abs() < 1e-12);
        assert!((correlation(&a, &c) + 1.0).abs() < 1e-12);
        assert!(correlation(&a, &numbers("k", &[5, 5, 5, 5])).is_nan());
    }

    #[test]
    fn histogram_density_integrates_to_one() {
        let values: Vec<f64> = (0..100).map(f64::from).collect();
        let (density, edges) = histogram(&values, 10);
        assert_eq!(density.len(), 10);
        assert_eq!(edges[0], 0.0);
        let width = edges[1] - edges[0];
        let area: f64 = density.iter().map(|d| d * width).sum();
        assert!((area - 1.0).abs() < 1e-9);
    }

    #[test]
    fn constant_sample_gets_unit_range() {
        let (density, edges) = histogram(&[3.0, 3.0], 10);
        assert_eq!(edges[0], 2.5);
        assert_eq!(density.iter().filter(|d| **d > 0.0).count(), 1);
    }

    #[test]
    fn top_values_are_ranked_by_frequency() {
        let col = Column {
            name: "c".into(),
            values: ["x", "y", "y", "z", "y", "x"]
                .iter()
                .map(|s| Value::Text((*s).into()))
                .chain([Value::Null, Value::Null, Value::Null, Value::Null])
                .collect(),
        };
        assert_eq!(
            top_values(&col),
            vec![("y".to_owned(), 3), ("x".to_owned(), 2), ("z".to_owned(), 1)]
        );
    }

    #[test]
    fn profile_contains_expected_components() {
        let mut table = Table::with_columns(["city", "sales"]);
        for (city, sales) in [("a", 1), ("b", 2), ("a", 3), ("c", 4)] {
            table.push_row(vec![Value::Text(city.into()), Value::Int(sales)]);
        }
        let content = profile(&table);
        let kinds: Vec<ComponentType> = content.components.iter().map(|c| c.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ComponentType::Table,
                ComponentType::PlotHeatmap,
                ComponentType::PlotBar,
                ComponentType::PlotBar,
                ComponentType::PlotHist,
            ]
        );
        assert_eq!(content.method_name, "GETTING_STARTED");
        let preview = content.components[0].data.as_ref().unwrap();
        assert_eq!(preview["city"].as_array().unwrap().len(), 3);
        let heatmap = content.components[1].data.as_ref().unwrap();
        let r: f64 = heatmap["values"][0][0].as_str().unwrap().parse().unwrap();
        assert!((r - 1.0).abs() < 1e-3);
    }

    #[test]
    fn text_only_table_has_no_heatmap() {
        let mut table = Table::with_columns(["name"]);
        table.push_row(vec![Value::Text("x".into())]);
        let content = profile(&table);
        assert!(content.components.iter().all(|c| c.kind != ComponentType::PlotHeatmap));
    }

    #[test]
    fn attached_dataset_is_profiled_in_full() {
        let mut table = Table::with_columns(["a"]);
        for i in 0..250 {
            table.push_row(vec![Value::Text((i % 2).to_string())]);
        }
        let dataset = Dataset {
            kind: crate::engine::dataset::FileKind::Csv,
            table,
        };
        let schema = Schema::from([("a".to_owned(), "int".to_owned())]);
        let capped = dataset.table.head(100);

        let content = ProfileBackend::new().present(&capped, Some((&dataset, &schema)));
        let bar = content
            .components
            .iter()
            .find(|c| c.kind == ComponentType::PlotBar)
            .unwrap();
        let data = bar.data.as_ref().unwrap();
        assert_eq!(data["values"][0], "125");
        assert!(content.components.iter().any(|c| c.kind == ComponentType::PlotHist));

        let fallback = ProfileBackend::new().present(&capped, None);
        let bar = fallback
            .components
            .iter()
            .find(|c| c.kind == ComponentType::PlotBar)
            .unwrap();
        assert_eq!(bar.data.as_ref().unwrap()["values"][0], "50");
    }
}
