//! Idempotent SQL that creates the application database and user.

use super::params::ParameterSet;

/// Host forms the application user is created for.
pub const USER_HOSTS: &[&str] = &["localhost", "127.0.0.1"];

/// Identifiers and the password were validated by `ParameterSet`, so they
/// can be embedded without escaping.
pub fn render_credentials_sql(params: &ParameterSet) -> String {
    let db = &params.db_name;
    let user = &params.db_user;
    let password = &params.db_password;

    let mut sql = format!(
        "CREATE DATABASE IF NOT EXISTS `{db}` CHARACTER SET utf8mb4 COLLATE utf8mb4_unicode_ci;\n"
    );
    for host in USER_HOSTS {
        sql.push_str(&format!(
            "CREATE USER IF NOT EXISTS '{user}'@'{host}' IDENTIFIED BY '{password}';\n"
        ));
        sql.push_str(&format!(
            "ALTER USER '{user}'@'{host}' IDENTIFIED BY '{password}';\n"
        ));
        sql.push_str(&format!(
            "GRANT ALL PRIVILEGES ON `{db}`.* TO '{user}'@'{host}';\n"
        ));
    }
    sql.push_str("FLUSH PRIVILEGES;\n");
    sql
}
