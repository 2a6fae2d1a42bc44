//! One-shot JSON repair: strict parse, then a single pass removing trailing
//! commas before `}` or `]` outside string literals, then give up.

use serde_json::Value;

pub fn strip_trailing_commas(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;
    for (i, &c) in chars.iter().enumerate() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            ',' => {
                let next = chars[i + 1..].iter().find(|c| !c.is_whitespace());
                if !matches!(next, Some('}') | Some(']')) {
                    out.push(c);
                }
            }
            _ => out.push(c),
        }
    }
    out
}

pub fn parse_lenient(text: &str) -> Result<Value, serde_json::Error> {
    match serde_json::from_str(text) {
        Ok(v) => Ok(v),
        Err(first) => {
            let repaired = strip_trailing_commas(text);
            if repaired == text {
                return Err(first);
            }
            serde_json::from_str(&repaired)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strict_json_passes_through() {
        assert_eq!(parse_lenient(r#"{"a": [1, 2]}"#).unwrap()["a"][1], 2);
    }

    #[test]
    fn trailing_commas_are_repaired() {
        let v = parse_lenient("{\"citations\": [\"u1\", \"u2\",\n], \"x\": 1,\n}").unwrap();
        assert_eq!(v["citations"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn commas_inside_strings_are_kept() {
        let v = parse_lenient(r#"{"a": "x,}", "b": [1,],}"#).unwrap();
        assert_eq!(v["a"], "x,}");
    }

    #[test]
    fn hopeless_input_fails() {
        assert!(parse_lenient("{answer: nope").is_err());
        assert!(parse_lenient("plain prose").is_err());
    }
}
