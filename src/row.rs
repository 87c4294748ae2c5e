use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;

/// Columns of a cost line item. Column keys are the lowercase names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Field {
    Id,
    Description,
    Category,
    Unit,
    Cost,
    Quantity,
    Total,
    Material,
    Labor,
    Machine,
    Area,
}

impl Field {
    pub const ALL: [Field; 11] = [
        Field::Id,
        Field::Description,
        Field::Category,
        Field::Unit,
        Field::Cost,
        Field::Quantity,
        Field::Total,
        Field::Material,
        Field::Labor,
        Field::Machine,
        Field::Area,
    ];

    /// Fields matched by the global search string.
    pub const SEARCHABLE: [Field; 3] = [Field::Description, Field::Id, Field::Category];

    pub fn key(&self) -> &'static str {
        match self {
            Field::Id => "id",
            Field::Description => "description",
            Field::Category => "category",
            Field::Unit => "unit",
            Field::Cost => "cost",
            Field::Quantity => "quantity",
            Field::Total => "total",
            Field::Material => "material",
            Field::Labor => "labor",
            Field::Machine => "machine",
            Field::Area => "area",
        }
    }

    /// Column header text.
    pub fn label(&self) -> &'static str {
        match self {
            Field::Id => "Code",
            Field::Description => "Description",
            Field::Category => "Category",
            Field::Unit => "Unit",
            Field::Cost => "Unit cost",
            Field::Quantity => "Quantity",
            Field::Total => "Total",
            Field::Material => "Material",
            Field::Labor => "Labor",
            Field::Machine => "Machine",
            Field::Area => "Area",
        }
    }

    pub fn from_key(key: &str) -> Option<Field> {
        let key = key.trim().to_lowercase();
        Field::ALL.iter().copied().find(|f| f.key() == key)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Field::Cost
                | Field::Quantity
                | Field::Total
                | Field::Material
                | Field::Labor
                | Field::Machine
                | Field::Area
        )
    }

    /// Whether the field holds a currency amount.
    pub fn is_monetary(&self) -> bool {
        matches!(
            self,
            Field::Cost | Field::Total | Field::Material | Field::Labor | Field::Machine
        )
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A single cell as seen by filters and comparators.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CellValue<'a> {
    Null,
    Number(f64),
    Text(&'a str),
}

impl CellValue<'_> {
    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    /// Text form used by `contains` and by the renderer. Null renders as empty.
    pub fn to_text(&self) -> Cow<'_, str> {
        match self {
            CellValue::Null => Cow::Borrowed(""),
            CellValue::Number(n) => Cow::Owned(n.to_string()),
            CellValue::Text(s) => Cow::Borrowed(s),
        }
    }
}

/// One construction cost line item. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub id: String,
    pub description: String,
    pub unit: Option<String>,
    pub category: Option<String>,
    pub unit_cost: Option<f64>,
    pub quantity: Option<f64>,
    pub subtotal: Option<f64>,
    pub material_cost: Option<f64>,
    pub labor_cost: Option<f64>,
    pub machine_cost: Option<f64>,
    pub area: Option<f64>,
}

impl Row {
    pub fn builder(id: impl Into<String>) -> RowBuilder {
        RowBuilder::new(id)
    }

    pub fn value(&self, field: Field) -> CellValue<'_> {
        fn text(s: &Option<String>) -> CellValue<'_> {
            s.as_deref().map_or(CellValue::Null, CellValue::Text)
        }
        fn number(n: Option<f64>) -> CellValue<'static> {
            n.map_or(CellValue::Null, CellValue::Number)
        }
        match field {
            Field::Id => CellValue::Text(&self.id),
            Field::Description => CellValue::Text(&self.description),
            Field::Category => text(&self.category),
            Field::Unit => text(&self.unit),
            Field::Cost => number(self.unit_cost),
            Field::Quantity => number(self.quantity),
            Field::Total => number(self.subtotal),
            Field::Material => number(self.material_cost),
            Field::Labor => number(self.labor_cost),
            Field::Machine => number(self.machine_cost),
            Field::Area => number(self.area),
        }
    }
}

/// Builds a [`Row`], enforcing the subtotal rule and null coercion.
#[derive(Debug, Clone, Default)]
pub struct RowBuilder {
    id: String,
    description: String,
    unit: Option<String>,
    category: Option<String>,
    unit_cost: Option<f64>,
    quantity: Option<f64>,
    total_override: Option<f64>,
    material_cost: Option<f64>,
    labor_cost: Option<f64>,
    machine_cost: Option<f64>,
    area: Option<f64>,
}

/// Non-finite numbers become null.
pub fn finite(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

/// Blank strings become null.
pub fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|s| {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            None
        } else if trimmed.len() == s.len() {
            Some(s)
        } else {
            Some(trimmed.to_string())
        }
    })
}

impl RowBuilder {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into().trim().to_string(),
            ..Default::default()
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into().trim().to_string();
        self
    }

    pub fn unit(mut self, unit: Option<String>) -> Self {
        self.unit = non_blank(unit);
        self
    }

    pub fn category(mut self, category: Option<String>) -> Self {
        self.category = non_blank(category);
        self
    }

    pub fn unit_cost(mut self, cost: Option<f64>) -> Self {
        self.unit_cost = finite(cost);
        self
    }

    /// Negative quantities are not meaningful and are dropped to null.
    pub fn quantity(mut self, quantity: Option<f64>) -> Self {
        self.quantity = finite(quantity).filter(|q| *q >= 0.0);
        self
    }

    /// Authoritative total from the source; wins over `unit_cost * quantity`.
    pub fn total_override(mut self, total: Option<f64>) -> Self {
        self.total_override = finite(total);
        self
    }

    pub fn material_cost(mut self, cost: Option<f64>) -> Self {
        self.material_cost = finite(cost);
        self
    }

    pub fn labor_cost(mut self, cost: Option<f64>) -> Self {
        self.labor_cost = finite(cost);
        self
    }

    pub fn machine_cost(mut self, cost: Option<f64>) -> Self {
        self.machine_cost = finite(cost);
        self
    }

    pub fn area(mut self, area: Option<f64>) -> Self {
        self.area = finite(area);
        self
    }

    pub fn build(self) -> Row {
        let subtotal = self.total_override.or(match (self.unit_cost, self.quantity) {
            (Some(cost), Some(qty)) => Some(cost * qty),
            _ => None,
        });
        Row {
            id: self.id,
            description: self.description,
            unit: self.unit,
            category: self.category,
            unit_cost: self.unit_cost,
            quantity: self.quantity,
            subtotal,
            material_cost: self.material_cost,
            labor_cost: self.labor_cost,
            machine_cost: self.machine_cost,
            area: self.area,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subtotal_is_cost_times_quantity() {
        let row = Row::builder("A")
            .unit_cost(Some(12.5))
            .quantity(Some(4.0))
            .build();
        assert_eq!(row.subtotal, Some(50.0));
    }

    #[test]
    fn test_total_override_wins() {
        let row = Row::builder("A")
            .unit_cost(Some(12.5))
            .quantity(Some(4.0))
            .total_override(Some(49.0))
            .build();
        assert_eq!(row.subtotal, Some(49.0));
    }

    #[test]
    fn test_subtotal_null_when_factor_missing() {
        let row = Row::builder("A").unit_cost(Some(12.5)).build();
        assert_eq!(row.subtotal, None);
    }

    #[test]
    fn test_boundary_coercion() {
        let row = Row::builder("  A ")
            .unit_cost(Some(f64::NAN))
            .quantity(Some(-1.0))
            .unit(Some("   ".to_string()))
            .category(Some(" Concrete ".to_string()))
            .build();
        assert_eq!(row.id, "A");
        assert_eq!(row.unit_cost, None);
        assert_eq!(row.quantity, None);
        assert_eq!(row.unit, None);
        assert_eq!(row.category.as_deref(), Some("Concrete"));
    }

    #[test]
    fn test_field_keys_round_trip() {
        for field in Field::ALL {
            assert_eq!(Field::from_key(field.key()), Some(field));
        }
        assert_eq!(Field::from_key(" COST "), Some(Field::Cost));
        assert_eq!(Field::from_key("nope"), None);
    }

    #[test]
    fn test_cell_text() {
        let row = Row::builder("A").unit_cost(Some(500.0)).build();
        assert_eq!(row.value(Field::Cost).to_text(), "500");
        assert_eq!(row.value(Field::Unit).to_text(), "");
        assert!(row.value(Field::Unit).is_null());
    }
}
