//! Validation of course data posted by scrapers.

use serde_json::Value;

use super::data::CoursesUpdate;
use super::error::Error;
use crate::database::TermDescriptor;
use crate::diff::{self, Tree};

/// Validate that a body posted to `POST /courses` is well-formed.
pub fn check(body: &Value) -> Result<CoursesUpdate, Error> {
    let map = body
        .as_object()
        .ok_or_else(|| invalid(format!("data is not a map: {body}")))?;

    let scraper = required(map, "scraper")?;
    let scraper = scraper
        .as_str()
        .ok_or_else(|| invalid(format!("scraper ID is not a string: {scraper}")))?;

    let term_info = required(map, "term")?;
    let term_map = term_info
        .as_object()
        .ok_or_else(|| invalid(format!("term info is not a map: {term_info}")))?;
    for key in ["termCode", "termName"] {
        let value = term_map.get(key).unwrap_or(&Value::Null);
        if !value.is_string() {
            return Err(invalid(format!("{key} is not a string: {value}")));
        }
    }
    let sort_key = term_map.get("termSortKey").unwrap_or(&Value::Null);
    let parts = sort_key
        .as_array()
        .ok_or_else(|| invalid(format!("termSortKey is not an array: {sort_key}")))?;
    for item in parts {
        let primitive = match item {
            Value::Bool(_) | Value::String(_) => true,
            Value::Number(number) => number.as_i64().is_some(),
            _ => false,
        };
        if !primitive {
            return Err(invalid(format!("termSortKey contains non-primitive: {item}")));
        }
    }
    let term: TermDescriptor = serde_json::from_value(term_info.clone())
        .map_err(|err| invalid(format!("malformed term info: {err}")))?;

    let courses = required(map, "courses")?;
    if !courses.is_object() {
        return Err(invalid(format!("courses is not a map: {courses}")));
    }
    if diff::contains_sentinel(courses) {
        return Err(invalid(
            "courses contain the reserved string \"$delete\"".to_owned(),
        ));
    }

    Ok(CoursesUpdate {
        scraper: scraper.to_owned(),
        term,
        courses: Tree::from_value(courses.clone()),
    })
}

fn required<'a>(map: &'a serde_json::Map<String, Value>, key: &str) -> Result<&'a Value, Error> {
    map.get(key)
        .ok_or_else(|| invalid(format!("missing key: {key}")))
}

fn invalid(message: String) -> Error {
    Error::InvalidBody(message)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn valid_body() -> Value {
        json!({
            "scraper": "s",
            "term": {
                "termCode": "FA2024",
                "termName": "Fall 2024",
                "termSortKey": [2024, false, "fall"],
            },
            "courses": {"A": 1},
        })
    }

    #[test]
    fn accepts_well_formed_body() {
        let update = check(&valid_body()).unwrap();
        assert_eq!(update.scraper, "s");
        assert_eq!(update.term.term_code, "FA2024");
        assert_eq!(update.courses.to_value(), json!({"A": 1}));
    }

    #[test]
    fn rejects_non_map_body() {
        let err = check(&json!([1, 2])).unwrap_err();
        assert!(err.to_string().starts_with("data is not a map"));
    }

    #[test]
    fn rejects_missing_keys() {
        for key in ["scraper", "term", "courses"] {
            let mut body = valid_body();
            body.as_object_mut().unwrap().remove(key);
            let err = check(&body).unwrap_err();
            assert_eq!(err.to_string(), format!("missing key: {key}"));
        }
    }

    #[test]
    fn rejects_non_string_scraper() {
        let mut body = valid_body();
        body["scraper"] = json!(17);
        let err = check(&body).unwrap_err();
        assert_eq!(err.to_string(), "scraper ID is not a string: 17");
    }

    #[test]
    fn rejects_non_string_term_fields() {
        let mut body = valid_body();
        body["term"]["termName"] = json!(null);
        let err = check(&body).unwrap_err();
        assert_eq!(err.to_string(), "termName is not a string: null");
    }

    #[test]
    fn rejects_non_array_sort_key() {
        let mut body = valid_body();
        body["term"]["termSortKey"] = json!("2024");
        let err = check(&body).unwrap_err();
        assert!(err.to_string().starts_with("termSortKey is not an array"));
    }

    #[test]
    fn rejects_non_primitive_sort_key_entries() {
        for bad in [json!([{}]), json!([[1]]), json!([2024.5]), json!([null])] {
            let mut body = valid_body();
            body["term"]["termSortKey"] = bad;
            let err = check(&body).unwrap_err();
            assert!(
                err.to_string().starts_with("termSortKey contains non-primitive"),
                "got: {err}"
            );
        }
    }

    #[test]
    fn rejects_non_map_courses() {
        let mut body = valid_body();
        body["courses"] = json!([1, 2, 3]);
        let err = check(&body).unwrap_err();
        assert!(err.to_string().starts_with("courses is not a map"));
    }

    #[test]
    fn rejects_sentinel_in_courses() {
        let mut body = valid_body();
        body["courses"] = json!({"A": {"B": "$delete"}});
        let err = check(&body).unwrap_err();
        assert!(err.to_string().contains("$delete"));
    }
}
