use serde_json::json;
use sql_templates::prelude::*;

fn sqlite() -> ResolveOptions {
    ResolveOptions::default().with_dialect(EscapeDialect::Sqlite)
}

#[test]
fn scalars_fill_placeholders_in_order() -> Result<(), Box<dyn std::error::Error>> {
    let params = params_from_json(json!([1, "x"]))?;
    let sql = resolve(
        "SELECT * FROM t WHERE a=? AND b=?",
        &params,
        ResolveOptions::default(),
    )?;
    assert_eq!(sql, "SELECT * FROM t WHERE a=1 AND b='x'");
    Ok(())
}

#[test]
fn json_objects_compile_by_position() -> Result<(), Box<dyn std::error::Error>> {
    let params = params_from_json(json!([
        {"password": "x", "name": "y"},
        {"id": 7, "deleted_at": null}
    ]))?;
    let sql = resolve("UPDATE users SET ? WHERE ?", &params, sqlite())?;
    assert_eq!(
        sql,
        "UPDATE users SET `password` = SHA1('x'), `name` = 'y' WHERE id = 7 AND deleted_at IS NULL"
    );
    Ok(())
}

#[test]
fn where_key_grammar() -> Result<(), Box<dyn std::error::Error>> {
    let cases = [
        (json!({"age>": 5}), "age >= 5"),
        (json!({"age<": 5}), "age <= 5"),
        (json!({"name!": "bob"}), "name != 'bob'"),
        (json!({"tags": ["a", "b"]}), "tags IN('a', 'b')"),
        (json!({"tags!": ["a", "b"]}), "tags NOT IN('a', 'b')"),
        (json!({"x": null}), "x IS NULL"),
        (json!({"password!": "pw"}), "password != SHA1('pw')"),
        (
            json!({"name LIKE": ["a%", "b%"]}),
            "(name LIKE 'a%' OR name LIKE 'b%')",
        ),
        (
            json!({"||": {"role": "admin", "owner": 3}}),
            "(role = 'admin' OR owner = 3)",
        ),
        (
            json!({"&&": [{"a": 1, "b": 2}, {"c": 3}]}),
            "((a = 1 AND b = 2) OR (c = 3))",
        ),
    ];
    for (object, expected) in cases {
        let params = params_from_json(json!([object]))?;
        let sql = resolve("WHERE ?", &params, sqlite())?;
        assert_eq!(sql, format!("WHERE {expected}"));
    }
    Ok(())
}

#[test]
fn or_groups_in_a_list_are_joined_with_and() -> Result<(), Box<dyn std::error::Error>> {
    let params = params_from_json(json!([{"||": [{"a": 1, "b": 2}, {"c": 3, "d": 4}]}]))?;
    let sql = resolve("SELECT 1 WHERE ?", &params, sqlite())?;
    assert_eq!(sql, "SELECT 1 WHERE (a = 1 OR b = 2) AND (c = 3 OR d = 4)");
    Ok(())
}

#[test]
fn singular_and_group_is_unsupported() -> Result<(), Box<dyn std::error::Error>> {
    let params = params_from_json(json!([{"&&": {"a": 1}}]))?;
    let err = resolve("SELECT 1 WHERE ?", &params, sqlite()).unwrap_err();
    assert!(matches!(err, SqlTemplateError::UnsupportedClause(_)));
    Ok(())
}

#[test]
fn identifiers_and_order_by() -> Result<(), Box<dyn std::error::Error>> {
    let params = params_from_json(json!(["name", "users", "created desc", "id ASC"]))?;
    let sql = resolve(
        "SELECT ?? FROM ?? ORDER BY ??, ??",
        &params[..3],
        sqlite(),
    )?;
    assert_eq!(sql, "SELECT `name` FROM `users` ORDER BY `created` DESC, ??");

    let sql = resolve("SELECT 1 ORDER BY ??", &params[3..], sqlite())?;
    assert_eq!(sql, "SELECT 1 ORDER BY `id` ASC");
    Ok(())
}

#[test]
fn underflow_policy() {
    let params = [Param::from(1)];
    let lenient = resolve("SELECT ?, ?", &params, sqlite()).unwrap();
    assert_eq!(lenient, "SELECT 1, ?");

    let strict = resolve(
        "SELECT ?, ?",
        &params,
        sqlite().with_underflow(UnderflowPolicy::Error),
    )
    .unwrap_err();
    assert!(matches!(
        strict,
        SqlTemplateError::PlaceholderUnderflow {
            placeholders: 2,
            params: 1
        }
    ));
}

#[test]
fn resolution_is_deterministic() -> Result<(), Box<dyn std::error::Error>> {
    let params = params_from_json(json!([{
        "z": 1, "a": [1, 2], "m LIKE": "%q%", "||": [{"b": 1}, {"c": 2}], "password": "pw"
    }]))?;
    let first = resolve("SELECT * FROM t WHERE ?", &params, sqlite())?.into_owned();
    let second = resolve("SELECT * FROM t WHERE ?", &params, sqlite())?.into_owned();
    assert_eq!(first, second);
    assert!(first.starts_with("SELECT * FROM t WHERE z = 1 AND a IN(1, 2)"));
    Ok(())
}

#[test]
fn identifier_escaping_is_reversible() {
    for name in ["id", "first name", "we\"ird", "uni\u{e9}"] {
        let quoted = escape_identifier(name);
        assert_eq!(quoted.replace('`', ""), name);
    }
}
