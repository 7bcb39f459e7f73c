pub fn render_schema(table: &str) -> String {
	include_str!("../../../sql/catalog_items.sql").replace("<TABLE>", table)
}

pub fn statements(sql: &str) -> impl Iterator<Item = &str> {
	sql.split(';').map(str::trim).filter(|statement| !statement.is_empty())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn substitutes_table_name_everywhere() {
		let sql = render_schema("films");

		assert!(!sql.contains("<TABLE>"));
		assert!(sql.contains("CREATE TABLE IF NOT EXISTS films"));
		assert!(sql.contains("films_attributes_idx ON films"));
		assert_eq!(statements(&sql).count(), 3);
	}
}
