//! Shopping list rendering.
//!
//! Rows are grouped by (name, measurement unit) rather than ingredient id, so
//! two catalog entries that only differ by id end up on one line.

use std::collections::BTreeMap;

use crate::constants::SHOPPING_LIST_HEADER;

use super::schema::{ShoppingListLine, ShoppingListRow};

pub fn aggregate(rows: Vec<ShoppingListRow>) -> Vec<ShoppingListLine> {
    let mut totals: BTreeMap<(String, String), i64> = BTreeMap::new();

    rows.into_iter().for_each(|row| {
        *totals.entry((row.name, row.measurement_unit)).or_insert(0) += i64::from(row.amount);
    });

    totals
        .into_iter()
        .map(|((name, measurement_unit), amount)| ShoppingListLine {
            name,
            measurement_unit,
            amount,
        })
        .collect()
}

pub fn render(lines: &[ShoppingListLine]) -> String {
    let mut document = format!("{SHOPPING_LIST_HEADER}\n");

    lines.iter().for_each(|line| {
        document += &format!(
            "{} - {}, {}\n",
            line.name, line.amount, line.measurement_unit
        );
    });

    document
}
