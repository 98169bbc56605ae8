//! FFI interface for C++ interop
//!
//! The host passes the fetched HTML together with a JSON page schema and
//! gets the resolved tree back as JSON. All strings are UTF-8.

use std::ffi::{c_char, CStr, CString};
use std::ptr;

use scraper::Html;
use serde::Serialize;

use crate::dom::{Scope, Selector, SelectorKind};
use crate::view::Page;

/// Result struct returned to C++
/// Both pointers are owned by Rust and must be freed via free_resolve_result
#[repr(C)]
pub struct ResolveResultFFI {
    /// JSON-serialized result (null-terminated)
    pub json_ptr: *mut c_char,
    /// Error message if resolution failed (null-terminated), or null on success
    pub error_ptr: *mut c_char,
}

/// Resolve a page schema against an HTML document.
///
/// # Arguments
/// * `html_ptr` - Pointer to HTML content (UTF-8, not necessarily null-terminated)
/// * `html_len` - Length of HTML content in bytes
/// * `schema_json` - JSON page definition (null-terminated)
///
/// # Returns
/// ResolveResultFFI with `json_ptr` set to `{"data": ..., "errors": [...]}`,
/// or `error_ptr` set when the input or the schema is unusable. Missing
/// elements are not failures; they show up as `null` and in `errors`.
///
/// # Safety
/// - `html_ptr` must point to valid memory of at least `html_len` bytes
/// - `schema_json` must be a valid null-terminated C string
/// - Caller must free the result via `free_resolve_result`
#[no_mangle]
pub unsafe extern "C" fn resolve_page_ffi(
    html_ptr: *const c_char,
    html_len: usize,
    schema_json: *const c_char,
) -> ResolveResultFFI {
    let html = match read_html(html_ptr, html_len) {
        Ok(html) => html,
        Err(msg) => return make_error_result(msg),
    };
    let schema = match read_c_str(schema_json) {
        Some(Ok(s)) => s,
        Some(Err(_)) => return make_error_result("Invalid UTF-8 in schema JSON"),
        None => return make_error_result("Schema JSON is null"),
    };

    let page = match Page::from_json(schema) {
        Ok(page) => page,
        Err(e) => return make_error_result(&format!("Failed to build schema: {}", e)),
    };

    make_json_result(&page.extract(&html))
}

/// Text of every element matching one selector, from the document node.
///
/// `kind` is one of `css`, `xpath`, `tag`. Returns a JSON array of strings.
///
/// # Safety
/// Same as resolve_page_ffi; `kind` and `expression` must be valid
/// null-terminated C strings
#[no_mangle]
pub unsafe extern "C" fn select_ffi(
    html_ptr: *const c_char,
    html_len: usize,
    kind: *const c_char,
    expression: *const c_char,
) -> ResolveResultFFI {
    let html = match read_html(html_ptr, html_len) {
        Ok(html) => html,
        Err(msg) => return make_error_result(msg),
    };
    let (kind, expression) = match (read_c_str(kind), read_c_str(expression)) {
        (Some(Ok(kind)), Some(Ok(expression))) => (kind, expression),
        (None, _) | (_, None) => return make_error_result("Selector is null"),
        _ => return make_error_result("Invalid UTF-8 in selector"),
    };

    let selector = match kind
        .parse::<SelectorKind>()
        .and_then(|kind| Selector::new(kind, expression))
    {
        Ok(selector) => selector,
        Err(e) => return make_error_result(&e.to_string()),
    };

    let document = Html::parse_document(&html);
    let texts: Vec<String> = selector
        .select(Scope::document(&document))
        .into_iter()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .collect();

    make_json_result(&texts)
}

/// Free a ResolveResultFFI returned by this module
///
/// # Safety
/// - `result` must have been returned by one of the functions above
/// - Must only be called once per result
#[no_mangle]
pub unsafe extern "C" fn free_resolve_result(result: ResolveResultFFI) {
    if !result.json_ptr.is_null() {
        drop(CString::from_raw(result.json_ptr));
    }
    if !result.error_ptr.is_null() {
        drop(CString::from_raw(result.error_ptr));
    }
}

unsafe fn read_html(html_ptr: *const c_char, html_len: usize) -> Result<String, &'static str> {
    if html_ptr.is_null() || html_len == 0 {
        return Ok(String::new());
    }
    let slice = std::slice::from_raw_parts(html_ptr as *const u8, html_len);
    std::str::from_utf8(slice)
        .map(str::to_string)
        .map_err(|_| "Invalid UTF-8 in HTML content")
}

unsafe fn read_c_str<'a>(ptr: *const c_char) -> Option<Result<&'a str, std::str::Utf8Error>> {
    if ptr.is_null() {
        None
    } else {
        Some(CStr::from_ptr(ptr).to_str())
    }
}

fn make_json_result<T: Serialize>(value: &T) -> ResolveResultFFI {
    match serde_json::to_string(value) {
        Ok(json) => match CString::new(json) {
            Ok(cstr) => ResolveResultFFI {
                json_ptr: cstr.into_raw(),
                error_ptr: ptr::null_mut(),
            },
            Err(_) => make_error_result("Result JSON contains null bytes"),
        },
        Err(e) => make_error_result(&format!("Failed to serialize result: {}", e)),
    }
}

// Helper to create error result
fn make_error_result(msg: &str) -> ResolveResultFFI {
    let error_cstr = CString::new(msg.replace('\0', " ")).unwrap_or_default();
    ResolveResultFFI {
        json_ptr: ptr::null_mut(),
        error_ptr: error_cstr.into_raw(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Takes ownership of the result and returns (json, error)
    fn consume(result: ResolveResultFFI) -> (Option<String>, Option<String>) {
        let read = |ptr: *mut c_char| {
            (!ptr.is_null()).then(|| unsafe { CStr::from_ptr(ptr).to_string_lossy().into_owned() })
        };
        let out = (read(result.json_ptr), read(result.error_ptr));
        unsafe { free_resolve_result(result) };
        out
    }

    #[test]
    fn test_resolve_page_ffi() {
        let html = r#"<div class="item"><span class="title">A</span></div><div class="item"></div>"#;
        let schema = CString::new(
            r#"{"children": [{"name": "items", "group": {"view": {
                "selector": {"kind": "css", "expression": ".item"},
                "children": [
                    {"name": "title", "field": {"kind": "css", "expression": ".title"}},
                    {"name": "meta", "view": {"selector": {"kind": "css", "expression": ".meta"}, "required": true}}
                ]}}}]}"#,
        )
        .unwrap();

        let result = unsafe { resolve_page_ffi(html.as_ptr() as *const c_char, html.len(), schema.as_ptr()) };
        let (json, error) = consume(result);
        assert!(error.is_none());

        let value: serde_json::Value = serde_json::from_str(&json.unwrap()).unwrap();
        assert_eq!(value["data"]["items"][0]["title"]["text"], "A");
        assert!(value["data"]["items"][1]["title"].is_null());
        assert_eq!(value["errors"].as_array().unwrap().len(), 2);
        assert_eq!(value["errors"][1]["path"], "items[1].meta");
    }

    #[test]
    fn test_resolve_page_ffi_bad_schema() {
        let html = "<p>x</p>";
        let schema = CString::new(r#"{"children": [{"name": "x", "field": {"kind": "css", "expression": "p[["}}]}"#).unwrap();

        let result = unsafe { resolve_page_ffi(html.as_ptr() as *const c_char, html.len(), schema.as_ptr()) };
        let (json, error) = consume(result);
        assert!(json.is_none());
        assert!(error.unwrap().starts_with("Failed to build schema"));

        let result = unsafe { resolve_page_ffi(html.as_ptr() as *const c_char, html.len(), ptr::null()) };
        assert_eq!(consume(result).1.as_deref(), Some("Schema JSON is null"));
    }

    #[test]
    fn test_select_ffi() {
        let html = "<ul><li> a </li><li>b</li></ul>";
        let kind = CString::new("xpath").unwrap();
        let expression = CString::new("//li").unwrap();

        let result = unsafe {
            select_ffi(html.as_ptr() as *const c_char, html.len(), kind.as_ptr(), expression.as_ptr())
        };
        let (json, error) = consume(result);
        assert!(error.is_none());
        assert_eq!(json.as_deref(), Some(r#"["a","b"]"#));

        // the document node is the context, so the root element matches too
        let tag = CString::new("TAG").unwrap();
        let html_tag = CString::new("html").unwrap();
        let result = unsafe {
            select_ffi(html.as_ptr() as *const c_char, html.len(), tag.as_ptr(), html_tag.as_ptr())
        };
        assert_eq!(consume(result).0.as_deref(), Some(r#"["a b"]"#));

        let bad_kind = CString::new("regex").unwrap();
        let result = unsafe {
            select_ffi(html.as_ptr() as *const c_char, html.len(), bad_kind.as_ptr(), expression.as_ptr())
        };
        assert!(consume(result).1.is_some());
    }
}
