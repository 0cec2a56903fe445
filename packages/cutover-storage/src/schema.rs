pub fn render_schema() -> String {
	expand_includes(include_str!("../../../sql/init.sql"))
}

fn expand_includes(sql: &str) -> String {
	let mut out = String::new();

	for line in sql.lines() {
		let trimmed = line.trim();

		if let Some(path) = trimmed.strip_prefix("\\ir ") {
			match path.trim() {
				"tables/001_users.sql" =>
					out.push_str(include_str!("../../../sql/tables/001_users.sql")),
				"tables/002_admins.sql" =>
					out.push_str(include_str!("../../../sql/tables/002_admins.sql")),
				"tables/003_categories.sql" =>
					out.push_str(include_str!("../../../sql/tables/003_categories.sql")),
				"tables/004_statements.sql" =>
					out.push_str(include_str!("../../../sql/tables/004_statements.sql")),
				"tables/005_quickes.sql" =>
					out.push_str(include_str!("../../../sql/tables/005_quickes.sql")),
				"tables/006_global_categories.sql" =>
					out.push_str(include_str!("../../../sql/tables/006_global_categories.sql")),
				"tables/007_global_statements.sql" =>
					out.push_str(include_str!("../../../sql/tables/007_global_statements.sql")),
				"tables/008_templates.sql" =>
					out.push_str(include_str!("../../../sql/tables/008_templates.sql")),
				"tables/009_changes.sql" =>
					out.push_str(include_str!("../../../sql/tables/009_changes.sql")),
				_ => out.push_str(line),
			}
		} else {
			out.push_str(line);
		}

		out.push('\n');
	}

	out
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn includes_are_expanded() {
		let sql = render_schema();

		assert!(!sql.contains("\\ir "));
		assert!(sql.contains("CREATE TABLE IF NOT EXISTS categories"));
		assert!(sql.contains("CREATE TABLE IF NOT EXISTS change_heads"));
	}
}
