//! FILENAME: core/cubing-engine/src/definition.rs
//! Cubing Definition - The serializable configuration.
//!
//! This module contains all the types needed to DESCRIBE a cubing group-by:
//! which columns are grouped plainly, which are folded by CUBE or ROLLUP,
//! how the value columns are aggregated and what labels folded columns get.
//! These structures are designed to be:
//! - Serializable (definitions can be loaded from JSON)
//! - Immutable snapshots of user intent

use std::fmt;
use std::str::FromStr;

use engine::CellValue;
use serde::{de, Deserialize, Deserializer, Serialize};

use crate::error::CubingError;

// ============================================================================
// AGGREGATION
// ============================================================================

/// Supported aggregation functions for value columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(try_from = "String", into = "String")]
pub enum AggregationType {
    #[default]
    Sum,
    Count,
    /// Number of distinct non-null values.
    CountDistinct,
    Average,
    Median,
    Min,
    Max,
    First,
    Last,
    Product,
    StdDev,
    StdDevP,
    Var,
    VarP,
}

impl AggregationType {
    /// Canonical operator name.
    pub fn name(&self) -> &'static str {
        match self {
            AggregationType::Sum => "sum",
            AggregationType::Count => "count",
            AggregationType::CountDistinct => "nunique",
            AggregationType::Average => "mean",
            AggregationType::Median => "median",
            AggregationType::Min => "min",
            AggregationType::Max => "max",
            AggregationType::First => "first",
            AggregationType::Last => "last",
            AggregationType::Product => "prod",
            AggregationType::StdDev => "std",
            AggregationType::StdDevP => "stdp",
            AggregationType::Var => "var",
            AggregationType::VarP => "varp",
        }
    }

    /// Whether the accumulator must remember every distinct value.
    pub fn needs_distinct(&self) -> bool {
        matches!(self, AggregationType::CountDistinct)
    }

    /// Whether the accumulator must remember every numeric sample.
    pub fn needs_samples(&self) -> bool {
        matches!(self, AggregationType::Median)
    }
}

impl FromStr for AggregationType {
    type Err = CubingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let aggregation = match s.trim().to_ascii_lowercase().as_str() {
            "sum" => AggregationType::Sum,
            "count" => AggregationType::Count,
            "nunique" | "count_distinct" => AggregationType::CountDistinct,
            "mean" | "avg" | "average" => AggregationType::Average,
            "median" => AggregationType::Median,
            "min" => AggregationType::Min,
            "max" => AggregationType::Max,
            "first" => AggregationType::First,
            "last" => AggregationType::Last,
            "prod" | "product" => AggregationType::Product,
            "std" | "stddev" => AggregationType::StdDev,
            "stdp" | "stddevp" => AggregationType::StdDevP,
            "var" => AggregationType::Var,
            "varp" => AggregationType::VarP,
            _ => return Err(CubingError::UnsupportedAggregation(s.to_string())),
        };
        Ok(aggregation)
    }
}

impl TryFrom<String> for AggregationType {
    type Error = CubingError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AggregationType> for String {
    fn from(value: AggregationType) -> Self {
        value.name().to_string()
    }
}

impl fmt::Display for AggregationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which value columns are aggregated, and how.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AggregationSpec {
    /// One operator applied to every non-grouping column, in table order.
    All(AggregationType),
    /// Explicit column -> operator list. Order is the output column order.
    PerColumn(#[serde(with = "ordered_pairs")] Vec<(String, AggregationType)>),
}

impl Default for AggregationSpec {
    fn default() -> Self {
        AggregationSpec::PerColumn(Vec::new())
    }
}

impl AggregationSpec {
    pub fn per_column<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, AggregationType)>,
        S: Into<String>,
    {
        AggregationSpec::PerColumn(pairs.into_iter().map(|(c, a)| (c.into(), a)).collect())
    }

    /// Builds a per-column spec from operator names, rejecting unknown names.
    pub fn parse_pairs(pairs: &[(&str, &str)]) -> Result<Self, CubingError> {
        let pairs = pairs
            .iter()
            .map(|(column, op)| Ok((column.to_string(), op.parse::<AggregationType>()?)))
            .collect::<Result<Vec<_>, CubingError>>()?;
        Ok(AggregationSpec::PerColumn(pairs))
    }
}

impl From<AggregationType> for AggregationSpec {
    fn from(value: AggregationType) -> Self {
        AggregationSpec::All(value)
    }
}

impl<'de> Deserialize<'de> for AggregationSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        RawAggregationSpec::deserialize(deserializer)?
            .resolve()
            .map_err(de::Error::custom)
    }
}

/// `AggregationSpec` with operator names not yet resolved, so an unknown
/// name is reported as such instead of as a shape mismatch.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawAggregationSpec {
    All(String),
    PerColumn(#[serde(with = "ordered_pairs")] Vec<(String, String)>),
}

impl RawAggregationSpec {
    fn resolve(self) -> Result<AggregationSpec, CubingError> {
        match self {
            RawAggregationSpec::All(op) => Ok(AggregationSpec::All(op.parse()?)),
            RawAggregationSpec::PerColumn(pairs) => pairs
                .into_iter()
                .map(|(column, op)| Ok((column, op.parse::<AggregationType>()?)))
                .collect::<Result<Vec<_>, CubingError>>()
                .map(AggregationSpec::PerColumn),
        }
    }
}

// ============================================================================
// FILL VALUES
// ============================================================================

/// The sentinel written into folded grouping columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FillGrouping {
    /// Per-column sentinels; unlisted columns are filled with null.
    PerColumn(#[serde(with = "ordered_pairs")] Vec<(String, CellValue)>),
    /// One sentinel for every folded column.
    Uniform(CellValue),
}

impl Default for FillGrouping {
    fn default() -> Self {
        FillGrouping::PerColumn(Vec::new())
    }
}

impl FillGrouping {
    pub fn per_column<I, S, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, V)>,
        S: Into<String>,
        V: Into<CellValue>,
    {
        FillGrouping::PerColumn(
            pairs
                .into_iter()
                .map(|(c, v)| (c.into(), v.into()))
                .collect(),
        )
    }

    /// The sentinel for a folded column.
    pub fn value_for(&self, column: &str) -> CellValue {
        match self {
            FillGrouping::Uniform(value) => value.clone(),
            FillGrouping::PerColumn(pairs) => pairs
                .iter()
                .find(|(c, _)| c == column)
                .map(|(_, v)| v.clone())
                .unwrap_or(CellValue::Null),
        }
    }
}

// ============================================================================
// OPTIONS
// ============================================================================

/// How rows with a null grouping value are treated by non-empty grouping sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum NullGrouping {
    /// Drop the row from that grouping set (legacy behavior). The grand total
    /// still includes it, so totals may not reconcile with the breakdown.
    #[default]
    Drop,
    /// Treat null as a group of its own.
    AsGroup,
}

/// Order of the output rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum OutputOrder {
    /// One contiguous block per grouping set, in enumeration order.
    #[default]
    GroupingSets,
    /// Stable sort of the union by every grouping column, nulls last.
    Sorted,
}

/// Selects the subset-enumeration strategy for a single column list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupingVariant {
    Cube,
    Rollup,
}

// ============================================================================
// MAIN DEFINITION STRUCT
// ============================================================================

/// The complete, serializable definition of a cubing group-by.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CubingDefinition {
    /// Columns always grouped by (plain GROUP BY), never folded.
    #[serde(deserialize_with = "one_or_many")]
    pub normal_cols: Vec<String>,

    /// Columns folded with CUBE semantics.
    #[serde(deserialize_with = "one_or_many")]
    pub cube_cols: Vec<String>,

    /// Columns folded with ROLLUP semantics (ordered from outer to inner).
    #[serde(deserialize_with = "one_or_many")]
    pub rollup_cols: Vec<String>,

    /// Value columns and their aggregation functions.
    pub agg: AggregationSpec,

    /// Sentinels for folded columns.
    pub fill_grouping: FillGrouping,

    /// Whether the grouping columns become the output's row index.
    pub as_index: bool,

    pub null_grouping: NullGrouping,

    pub output_order: OutputOrder,

    /// When set, an integer column with this name holds each row's
    /// grouping id (bit set = column folded, first grouping column is the
    /// most significant bit).
    pub grouping_id_column: Option<String>,
}

impl Default for CubingDefinition {
    fn default() -> Self {
        CubingDefinition {
            normal_cols: Vec::new(),
            cube_cols: Vec::new(),
            rollup_cols: Vec::new(),
            agg: AggregationSpec::default(),
            fill_grouping: FillGrouping::default(),
            as_index: true,
            null_grouping: NullGrouping::Drop,
            output_order: OutputOrder::GroupingSets,
            grouping_id_column: None,
        }
    }
}

impl CubingDefinition {
    /// CUBE over `cols`.
    pub fn cube<S: AsRef<str>>(cols: &[S], agg: impl Into<AggregationSpec>) -> Self {
        Self::for_variant(GroupingVariant::Cube, cols, agg)
    }

    /// ROLLUP over `cols`.
    pub fn rollup<S: AsRef<str>>(cols: &[S], agg: impl Into<AggregationSpec>) -> Self {
        Self::for_variant(GroupingVariant::Rollup, cols, agg)
    }

    pub fn for_variant<S: AsRef<str>>(
        variant: GroupingVariant,
        cols: &[S],
        agg: impl Into<AggregationSpec>,
    ) -> Self {
        let cols: Vec<String> = cols.iter().map(|c| c.as_ref().to_string()).collect();
        let mut def = CubingDefinition {
            agg: agg.into(),
            ..Default::default()
        };
        match variant {
            GroupingVariant::Cube => def.cube_cols = cols,
            GroupingVariant::Rollup => def.rollup_cols = cols,
        }
        def
    }

    /// Loads a definition from JSON. An unknown operator name fails with
    /// `UnsupportedAggregation`.
    pub fn from_json(json: &str) -> Result<Self, CubingError> {
        #[derive(Deserialize)]
        struct AggOnly {
            agg: Option<RawAggregationSpec>,
        }

        if let Ok(AggOnly { agg: Some(raw) }) = serde_json::from_str::<AggOnly>(json) {
            raw.resolve()?;
        }
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, CubingError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn with_normal_cols<S: AsRef<str>>(mut self, cols: &[S]) -> Self {
        self.normal_cols = cols.iter().map(|c| c.as_ref().to_string()).collect();
        self
    }

    pub fn with_cube_cols<S: AsRef<str>>(mut self, cols: &[S]) -> Self {
        self.cube_cols = cols.iter().map(|c| c.as_ref().to_string()).collect();
        self
    }

    pub fn with_rollup_cols<S: AsRef<str>>(mut self, cols: &[S]) -> Self {
        self.rollup_cols = cols.iter().map(|c| c.as_ref().to_string()).collect();
        self
    }

    pub fn with_fill(mut self, fill: FillGrouping) -> Self {
        self.fill_grouping = fill;
        self
    }

    pub fn with_as_index(mut self, as_index: bool) -> Self {
        self.as_index = as_index;
        self
    }

    pub fn with_null_grouping(mut self, null_grouping: NullGrouping) -> Self {
        self.null_grouping = null_grouping;
        self
    }

    pub fn with_output_order(mut self, output_order: OutputOrder) -> Self {
        self.output_order = output_order;
        self
    }

    pub fn with_grouping_id_column(mut self, name: impl Into<String>) -> Self {
        self.grouping_id_column = Some(name.into());
        self
    }

    /// All grouping columns in canonical order: normal, cube, rollup.
    pub fn grouping_columns(&self) -> Vec<&str> {
        self.normal_cols
            .iter()
            .chain(self.cube_cols.iter())
            .chain(self.rollup_cols.iter())
            .map(String::as_str)
            .collect()
    }
}

// ============================================================================
// SERDE HELPERS
// ============================================================================

/// Accepts either a single column name or a list of names.
fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(OneOrMany::One(col)) => vec![col],
        Some(OneOrMany::Many(cols)) => cols,
    })
}

/// (De)serializes a `Vec<(String, V)>` as a JSON object, keeping key order.
mod ordered_pairs {
    use std::fmt;
    use std::marker::PhantomData;

    use serde::de::{MapAccess, Visitor};
    use serde::ser::SerializeMap;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[allow(clippy::ptr_arg)]
    pub fn serialize<S, V>(pairs: &Vec<(String, V)>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        V: Serialize,
    {
        let mut map = serializer.serialize_map(Some(pairs.len()))?;
        for (key, value) in pairs {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }

    pub fn deserialize<'de, D, V>(deserializer: D) -> Result<Vec<(String, V)>, D::Error>
    where
        D: Deserializer<'de>,
        V: Deserialize<'de>,
    {
        struct PairsVisitor<V>(PhantomData<V>);

        impl<'de, V: Deserialize<'de>> Visitor<'de> for PairsVisitor<V> {
            type Value = Vec<(String, V)>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map from column name to value")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut pairs = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((key, value)) = access.next_entry::<String, V>()? {
                    pairs.push((key, value));
                }
                Ok(pairs)
            }
        }

        deserializer.deserialize_map(PairsVisitor(PhantomData))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_aggregation_names() {
        assert_eq!("sum".parse::<AggregationType>().unwrap(), AggregationType::Sum);
        assert_eq!("MEAN".parse::<AggregationType>().unwrap(), AggregationType::Average);
        assert_eq!("nunique".parse::<AggregationType>().unwrap(), AggregationType::CountDistinct);
        assert!(matches!(
            "mode".parse::<AggregationType>(),
            Err(CubingError::UnsupportedAggregation(name)) if name == "mode"
        ));
    }

    #[test]
    fn test_parse_pairs_rejects_unknown_operator() {
        let spec = AggregationSpec::parse_pairs(&[("price", "sum"), ("qty", "avg")]).unwrap();
        assert_eq!(
            spec,
            AggregationSpec::per_column([
                ("price", AggregationType::Sum),
                ("qty", AggregationType::Average),
            ])
        );
        assert!(AggregationSpec::parse_pairs(&[("price", "total")]).is_err());
    }

    #[test]
    fn test_fill_value_defaults_to_null() {
        let fill = FillGrouping::per_column([("product", "TOTAL")]);
        assert_eq!(fill.value_for("product"), CellValue::from("TOTAL"));
        assert_eq!(fill.value_for("region"), CellValue::Null);

        let uniform = FillGrouping::Uniform(CellValue::from("ALL"));
        assert_eq!(uniform.value_for("region"), CellValue::from("ALL"));
    }

    #[test]
    fn test_definition_from_json() {
        let def = CubingDefinition::from_json(
            r#"{
                "cube_cols": "product",
                "rollup_cols": ["year", "month"],
                "agg": {"qty": "count", "price": "sum"},
                "fill_grouping": {"product": "TOTAL"},
                "as_index": false
            }"#,
        )
        .unwrap();

        assert_eq!(def.cube_cols, vec!["product"]);
        assert_eq!(def.rollup_cols, vec!["year", "month"]);
        assert!(def.normal_cols.is_empty());
        // Key order in the JSON object is kept
        assert_eq!(
            def.agg,
            AggregationSpec::per_column([
                ("qty", AggregationType::Count),
                ("price", AggregationType::Sum),
            ])
        );
        assert_eq!(def.fill_grouping.value_for("product"), CellValue::from("TOTAL"));
        assert!(!def.as_index);
        assert_eq!(def.null_grouping, NullGrouping::Drop);
        assert_eq!(def.grouping_columns(), vec!["product", "year", "month"]);
    }

    #[test]
    fn test_definition_json_single_operator_and_uniform_fill() {
        let def = CubingDefinition::from_json(
            r#"{"cube_cols": ["a"], "agg": "mean", "fill_grouping": "ALL"}"#,
        )
        .unwrap();
        assert_eq!(def.agg, AggregationSpec::All(AggregationType::Average));
        assert_eq!(def.fill_grouping, FillGrouping::Uniform(CellValue::from("ALL")));
        assert!(def.as_index);
    }

    #[test]
    fn test_definition_json_rejects_unknown_operator() {
        let result = CubingDefinition::from_json(r#"{"cube_cols": ["a"], "agg": {"b": "mode"}}"#);
        assert!(matches!(
            result,
            Err(CubingError::UnsupportedAggregation(name)) if name == "mode"
        ));

        let result = CubingDefinition::from_json(r#"{"agg": "total"}"#);
        assert!(matches!(
            result,
            Err(CubingError::UnsupportedAggregation(name)) if name == "total"
        ));

        // Plain serde keeps the operator name in the message
        let err = serde_json::from_str::<CubingDefinition>(r#"{"agg": {"b": "mode"}}"#)
            .unwrap_err()
            .to_string();
        assert!(err.contains("Unsupported aggregation: mode"), "{}", err);

        // Shape errors are still reported as invalid definitions
        let result = CubingDefinition::from_json(r#"{"agg": 3}"#);
        assert!(matches!(result, Err(CubingError::InvalidDefinition(_))));
    }

    #[test]
    fn test_definition_json_round_trip() {
        let def = CubingDefinition::rollup(&["year", "month"], AggregationType::Sum)
            .with_fill(FillGrouping::per_column([("year", "ALL")]))
            .with_null_grouping(NullGrouping::AsGroup);
        let back = CubingDefinition::from_json(&def.to_json().unwrap()).unwrap();
        assert_eq!(back, def);
    }
}
