use serde_json::{json, Value as JsonValue};
use unmeshedcore::{JsonMap, StepError};

/// Returns a nested list; the first item's `val` counts the input keys
///
/// A list is not an object, so it reaches the engine wrapped as `result`.
pub fn list_no_test(input: JsonMap) -> Result<JsonValue, StepError> {
    Ok(json!([
        "23232",
        {
            "val": input.len(),
            "id": "1",
            "name": "Item 1",
            "tags": ["tag1", "tag2"],
            "details": {
                "description": "This is a description for item 1",
                "attributes": [100, 200, 300]
            }
        },
        {
            "id": "2",
            "name": "Item 2",
            "tags": ["tag3", "tag4"],
            "details": {
                "description": "This is a description for item 2",
                "attributes": [400, 500, 600]
            }
        },
        {
            "id": "3",
            "name": "Item 3",
            "tags": ["tag5", "tag6"],
            "details": {
                "description": "This is a description for item 3",
                "attributes": [700, 800, 900]
            }
        }
    ]))
}
