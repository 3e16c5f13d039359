//! # Tool Output Parsing
//!
//! `pkcs11-tool` prints free text. These parsers pull the fields the adapter
//! needs out of it line by line. Unknown lines are skipped and missing
//! fields stay empty; malformed output never fails to parse.
//!
//! Slot listing (`-L`):
//!
//! ```text
//! Slot 0 (0x2d6b0b0a): SoftHSM slot ID 0x2d6b0b0a
//!   token label        : MyToken
//!   token manufacturer : SoftHSM project
//!   token flags        : login required, rng, token initialized, ...
//!   serial num         : 8f0a1c2d2d6b0b0a
//! ```
//!
//! Object listing (`-O`):
//!
//! ```text
//! Private Key Object; RSA
//!   label:      TestRSAKey
//!   Usage:      decrypt, sign, unwrap
//!   Access:     sensitive, always sensitive, never extractable, local
//! ```

use super::types::{ObjectClass, Token, TokenObject, TokenState};

/// Parse `pkcs11-tool -L` output into one [`Token`] per slot.
pub fn parse_slots(output: &str) -> Vec<Token> {
    let mut tokens: Vec<Token> = Vec::new();

    for line in output.lines() {
        let trimmed = line.trim();

        if let Some(rest) = trimmed.strip_prefix("Slot ") {
            tokens.push(parse_slot_header(rest));
            continue;
        }

        let Some(current) = tokens.last_mut() else {
            continue;
        };
        let Some((key, value)) = trimmed.split_once(':') else {
            continue;
        };
        let value = value.trim();

        match key.trim() {
            "token label" => current.label = value.to_string(),
            "token manufacturer" => current.manufacturer = value.to_string(),
            "token model" => current.model = value.to_string(),
            "serial num" => current.serial_number = value.to_string(),
            "token flags" => {
                if value.split(',').any(|f| f.trim() == "token initialized") {
                    current.state = TokenState::Initialized;
                }
            }
            "token state" => {
                if value == "uninitialized" {
                    current.state = TokenState::Uninitialized;
                }
            }
            _ => {}
        }
    }

    tokens
}

/// `0 (0x2d6b0b0a): SoftHSM slot ID 0x2d6b0b0a`
fn parse_slot_header(rest: &str) -> Token {
    let mut token = Token::default();

    let index = rest.split_whitespace().next().unwrap_or_default();
    token.slot_index = index.parse().ok();

    if let (Some(open), Some(close)) = (rest.find('('), rest.find(')')) {
        if open < close {
            token.slot_id = rest[open + 1..close].trim().to_string();
        }
    }
    if token.slot_id.is_empty() {
        token.slot_id = index.trim_end_matches(':').to_string();
    }

    token
}

/// Parse `pkcs11-tool -O` output into one [`TokenObject`] per section.
pub fn parse_objects(output: &str) -> Vec<TokenObject> {
    let mut objects: Vec<TokenObject> = Vec::new();

    for line in output.lines() {
        let indented = line.starts_with(char::is_whitespace);

        if !indented {
            if let Some(object) = parse_object_header(line.trim()) {
                objects.push(object);
            }
            continue;
        }

        let Some(current) = objects.last_mut() else {
            continue;
        };
        let Some((key, value)) = line.trim().split_once(':') else {
            continue;
        };
        let value = value.trim();

        match key.trim() {
            "label" => current.label = unquote(value).to_string(),
            "Usage" => current.usage = split_flags(value),
            "Access" => current.access = split_flags(value),
            _ => {}
        }
    }

    objects
}

fn parse_object_header(line: &str) -> Option<TokenObject> {
    const HEADERS: [(&str, ObjectClass); 5] = [
        ("Private Key Object", ObjectClass::Private),
        ("Public Key Object", ObjectClass::Public),
        ("Secret Key Object", ObjectClass::Secret),
        ("Certificate Object", ObjectClass::Certificate),
        ("Data object", ObjectClass::Data),
    ];

    let (class, rest) = HEADERS
        .iter()
        .find_map(|(prefix, class)| line.strip_prefix(prefix).map(|rest| (*class, rest)))?;

    let key_type = match class {
        ObjectClass::Private | ObjectClass::Public | ObjectClass::Secret => rest
            .trim_start_matches(';')
            .split_whitespace()
            .next()
            .map(str::to_string),
        _ => None,
    };

    Some(TokenObject {
        class,
        key_type,
        label: String::new(),
        usage: Vec::new(),
        access: Vec::new(),
    })
}

fn split_flags(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|f| !f.is_empty() && *f != "none")
        .map(str::to_string)
        .collect()
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('\'')
        .and_then(|v| v.strip_suffix('\''))
        .unwrap_or(value)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const SLOTS: &str = "\
Available slots:
Slot 0 (0x2d6b0b0a): SoftHSM slot ID 0x2d6b0b0a
  token label        : MyToken
  token manufacturer : SoftHSM project
  token model        : SoftHSM v2
  token flags        : login required, rng, token initialized, PIN initialized, other flags=0x20
  hardware version   : 2.6
  firmware version   : 2.6
  serial num         : 8f0a1c2d2d6b0b0a
  pin min/max        : 4/255
Slot 1 (0x1): SoftHSM slot ID 0x1
  token state:   uninitialized
";

    const OBJECTS: &str = "\
Using slot 0 with a present token (0x2d6b0b0a)
Public Key Object; RSA 2048 bits
  label:      TestRSAKey
  Usage:      encrypt, verify, wrap
  Access:     local
Private Key Object; RSA
  label:      TestRSAKey
  Usage:      decrypt, sign, unwrap
  Access:     sensitive, always sensitive, never extractable, local
Public Key Object; EC  EC_POINT 256 bits
  EC_POINT:   044104a1b2
  EC_PARAMS:  06082a8648ce3d030107
  label:      SigningKey
  Usage:      verify
  Access:     local
Certificate Object; type = X.509 cert
  label:      device-cert
  subject:    DN: CN=device
Data object 2184
  label:      'config-blob'
  application: ''
";

    #[test]
    fn test_parse_slots() {
        let tokens = parse_slots(SLOTS);
        assert_eq!(tokens.len(), 2);

        let first = &tokens[0];
        assert_eq!(first.slot_index, Some(0));
        assert_eq!(first.slot_id, "0x2d6b0b0a");
        assert_eq!(first.label, "MyToken");
        assert_eq!(first.manufacturer, "SoftHSM project");
        assert_eq!(first.model, "SoftHSM v2");
        assert_eq!(first.serial_number, "8f0a1c2d2d6b0b0a");
        assert_eq!(first.state, TokenState::Initialized);

        let second = &tokens[1];
        assert_eq!(second.slot_id, "0x1");
        assert_eq!(second.label, "");
        assert_eq!(second.state, TokenState::Uninitialized);
    }

    #[test]
    fn test_flags_without_initialized() {
        let output = "Slot 3 (0x3): x\n  token label : Fresh\n  token flags : login required, rng\n";
        let tokens = parse_slots(output);
        assert_eq!(tokens[0].label, "Fresh");
        assert!(!tokens[0].is_initialized());
    }

    #[test]
    fn test_parse_slots_garbage() {
        assert!(parse_slots("").is_empty());
        assert!(parse_slots("error: no slots\n  token label : Orphan\n").is_empty());

        let tokens = parse_slots("Slot (broken\n");
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].slot_index, None);
        assert_eq!(tokens[0].label, "");
    }

    #[test]
    fn test_parse_objects() {
        let objects = parse_objects(OBJECTS);
        assert_eq!(objects.len(), 5);

        assert_eq!(objects[0].class, ObjectClass::Public);
        assert_eq!(objects[0].key_type.as_deref(), Some("RSA"));
        assert_eq!(objects[0].label, "TestRSAKey");
        assert_eq!(objects[0].usage, vec!["encrypt", "verify", "wrap"]);

        assert_eq!(objects[1].class, ObjectClass::Private);
        assert_eq!(objects[1].label, "TestRSAKey");
        assert_eq!(
            objects[1].access,
            vec!["sensitive", "always sensitive", "never extractable", "local"]
        );

        assert_eq!(objects[2].key_type.as_deref(), Some("EC"));
        assert_eq!(objects[2].label, "SigningKey");

        assert_eq!(objects[3].class, ObjectClass::Certificate);
        assert_eq!(objects[3].key_type, None);
        assert_eq!(objects[3].label, "device-cert");

        assert_eq!(objects[4].class, ObjectClass::Data);
        assert_eq!(objects[4].label, "config-blob");
    }

    #[test]
    fn test_parse_objects_empty_token() {
        assert!(parse_objects("Using slot 0 with a present token (0x0)\n").is_empty());
    }

    #[test]
    fn test_usage_none() {
        let objects = parse_objects("Secret Key Object; AES length 32\n  label: wrap\n  Usage: none\n");
        assert_eq!(objects[0].class, ObjectClass::Secret);
        assert_eq!(objects[0].key_type.as_deref(), Some("AES"));
        assert!(objects[0].usage.is_empty());
    }
}
