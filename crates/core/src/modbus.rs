//! Modbus protocol table parsing.
//!
//! Protocol configs arrive as CSV documents with a header row of
//! `name, key, address, length, type, function, scale, unit, bits`
//! (case-insensitive, any column order). Each data row describes one
//! register; the optional `bits` column breaks a register value into named
//! bit flags with the syntax `pos:key:name(;pos:key:name)*`.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Modbus function space a register is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegisterFunction {
    /// Unrecognized or not yet defaulted.
    None,
    /// Holding registers.
    Hold,
    /// Input registers.
    Input,
    /// Coils.
    Coil,
}

impl fmt::Display for RegisterFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let token = match self {
            Self::None => "",
            Self::Hold => "hold",
            Self::Input => "input",
            Self::Coil => "coil",
        };
        f.write_str(token)
    }
}

/// Value interpretation for a register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegisterType {
    /// Unrecognized or not yet defaulted.
    None,
    /// Signed integer.
    Int,
    /// IEEE float.
    Float,
}

impl fmt::Display for RegisterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let token = match self {
            Self::None => "",
            Self::Int => "int",
            Self::Float => "float",
        };
        f.write_str(token)
    }
}

/// One named bit inside a register value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterBit {
    /// Bit position, 0-based.
    pub bit: u32,
    /// Stable key for the bit value.
    pub key: String,
    /// Human-readable bit name.
    pub name: String,
}

/// A parsed register row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModbusRegister {
    pub name: String,
    pub key: String,
    pub address: u16,
    pub length: u16,
    pub kind: RegisterType,
    pub function: RegisterFunction,
    pub scale: f64,
    pub unit: String,
    pub bits: Vec<RegisterBit>,
}

/// Parse a protocol CSV document into register definitions.
///
/// Rows starting with `//` or `#` in the first field are comments; rows with
/// fewer than four fields are skipped. A missing header row is an error,
/// anything else degrades per field (invalid numbers parse as 0, unknown
/// type/function tokens log and fall through the defaulting pass).
pub fn parse_modbus_csv(content: &str) -> CoreResult<Vec<ModbusRegister>> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);

    let mut lines = content.lines();
    let header_line = lines
        .next()
        .ok_or_else(|| CoreError::Serialization("protocol CSV is empty".to_string()))?;

    let headers = split_csv_line(header_line);
    let index: HashMap<String, usize> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| (h.trim().to_lowercase(), i))
        .collect();
    if index.is_empty() {
        return Err(CoreError::Serialization(
            "protocol CSV header row is empty".to_string(),
        ));
    }

    let mut registers = Vec::new();
    for line in lines {
        if line.trim().is_empty() {
            continue;
        }
        let record: Vec<String> = split_csv_line(line)
            .into_iter()
            .map(|f| f.trim().to_string())
            .collect();
        if record.len() < 4 {
            continue;
        }
        if record[0].starts_with("//") || record[0].starts_with('#') {
            continue;
        }

        let get = |field: &str| -> &str {
            index
                .get(field)
                .and_then(|&i| record.get(i))
                .map(String::as_str)
                .unwrap_or("")
        };

        let kind = match get("type") {
            "" | "int" => RegisterType::Int,
            "float" => RegisterType::Float,
            other => {
                tracing::warn!(token = other, "invalid register type");
                RegisterType::None
            }
        };
        let function = match get("function") {
            "" | "hold" => RegisterFunction::Hold,
            "input" => RegisterFunction::Input,
            "coil" => RegisterFunction::Coil,
            other => {
                tracing::warn!(token = other, "invalid register function");
                RegisterFunction::None
            }
        };

        let address = get("address").parse::<u16>().unwrap_or(0);
        let length = get("length").parse::<u16>().unwrap_or(0);
        let scale = match get("scale") {
            "" => 1.0,
            s => s.parse::<f64>().unwrap_or(0.0),
        };

        let bits = match get("bits") {
            "" => Vec::new(),
            raw => parse_bits(raw),
        };

        registers.push(ModbusRegister {
            name: get("name").to_string(),
            key: get("key").to_string(),
            address,
            length,
            kind,
            function,
            scale,
            unit: get("unit").to_string(),
            bits,
        });
    }

    Ok(apply_register_defaults(registers))
}

/// Render register definitions back to the canonical CSV layout.
pub fn render_modbus_csv(registers: &[ModbusRegister]) -> String {
    let mut lines = Vec::with_capacity(registers.len() + 1);
    lines.push("name,key,address,length,type,function,scale,unit,bits".to_string());
    for reg in registers {
        let bits = reg
            .bits
            .iter()
            .map(|b| format!("{}:{}:{}", b.bit, b.key, b.name))
            .collect::<Vec<_>>()
            .join(";");
        lines.push(format!(
            "{},{},{},{},{},{},{},{},{}",
            csv_escape(&reg.name),
            csv_escape(&reg.key),
            reg.address,
            reg.length,
            reg.kind,
            reg.function,
            reg.scale,
            csv_escape(&reg.unit),
            csv_escape(&bits),
        ));
    }
    lines.join("\n")
}

/// Parse a `pos:key:name;pos:key:name` bit list. Malformed tuples are
/// skipped; whitespace around tokens is tolerated.
fn parse_bits(raw: &str) -> Vec<RegisterBit> {
    let mut bits = Vec::new();
    for entry in raw.split(';') {
        let parts: Vec<&str> = entry.trim().split(':').collect();
        if parts.len() != 3 {
            continue;
        }
        let Ok(pos) = parts[0].trim().parse::<u32>() else {
            continue;
        };
        bits.push(RegisterBit {
            bit: pos,
            key: parts[1].trim().to_string(),
            name: parts[2].trim().to_string(),
        });
    }
    bits
}

/// Fill in the row-level defaults: function and type fall back to `input` /
/// `int`, a zero scale becomes 1.0, and an empty key is backfilled from the
/// row index.
fn apply_register_defaults(mut registers: Vec<ModbusRegister>) -> Vec<ModbusRegister> {
    for (i, reg) in registers.iter_mut().enumerate() {
        if reg.function == RegisterFunction::None {
            reg.function = RegisterFunction::Input;
        }
        if reg.kind == RegisterType::None {
            reg.kind = RegisterType::Int;
        }
        if reg.scale == 0.0 {
            reg.scale = 1.0;
        }
        if reg.key.is_empty() {
            reg.key = format!("Key{i}");
        }
    }
    registers
}

/// Split one CSV line into fields, honoring double-quote escaping.
fn split_csv_line(line: &str) -> Vec<String> {
    let mut result = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(ch) = chars.next() {
        if in_quotes {
            if ch == '"' {
                if chars.peek() == Some(&'"') {
                    current.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            } else {
                current.push(ch);
            }
        } else if ch == '"' {
            in_quotes = true;
        } else if ch == ',' {
            result.push(current.clone());
            current.clear();
        } else {
            current.push(ch);
        }
    }
    result.push(current);
    result
}

/// Quote a field when it contains a comma, quote, or newline.
fn csv_escape(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
name,key,address,length,type,function,scale,unit,bits
Voltage,volt,100,2,float,input,0.1,V,
Current,amp,102,2,float,input,0.01,A,
Status,,200,1,int,hold,,,0:run:Running;1:fault:Fault
";

    #[test]
    fn parses_registers_with_headers() {
        let regs = parse_modbus_csv(SAMPLE).unwrap();
        assert_eq!(regs.len(), 3);
        assert_eq!(regs[0].name, "Voltage");
        assert_eq!(regs[0].address, 100);
        assert_eq!(regs[0].kind, RegisterType::Float);
        assert_eq!(regs[0].function, RegisterFunction::Input);
        assert!((regs[0].scale - 0.1).abs() < f64::EPSILON);
    }

    #[test]
    fn header_is_case_insensitive_and_bom_stripped() {
        let csv = "\u{feff}Name,Key,ADDRESS,Length\nTemp,t,10,1\n";
        let regs = parse_modbus_csv(csv).unwrap();
        assert_eq!(regs.len(), 1);
        assert_eq!(regs[0].name, "Temp");
        assert_eq!(regs[0].address, 10);
    }

    #[test]
    fn comment_and_short_rows_are_skipped() {
        let csv = "\
name,key,address,length
// a comment row,,0,0
# another,,0,0
short,row
Real,r,5,1
";
        let regs = parse_modbus_csv(csv).unwrap();
        assert_eq!(regs.len(), 1);
        assert_eq!(regs[0].name, "Real");
    }

    #[test]
    fn defaults_cover_every_register() {
        let csv = "\
name,key,address,length,type,function,scale
A,,1,1,,,
B,,2,1,bogus,bogus,0
";
        let regs = parse_modbus_csv(csv).unwrap();
        for (i, reg) in regs.iter().enumerate() {
            assert_ne!(reg.function, RegisterFunction::None);
            assert_ne!(reg.kind, RegisterType::None);
            assert!(reg.scale != 0.0);
            assert_eq!(reg.key, format!("Key{i}"));
        }
        // Blank function defaults to hold at parse time, not input.
        assert_eq!(regs[0].function, RegisterFunction::Hold);
        // Unknown tokens fall through to the post-pass defaults.
        assert_eq!(regs[1].function, RegisterFunction::Input);
        assert_eq!(regs[1].kind, RegisterType::Int);
    }

    #[test]
    fn bits_syntax_tolerates_whitespace_and_garbage() {
        let csv = "\
name,key,address,length,bits
S,s,1,1,0 : run : Running ; nonsense ; 2:stop:Stopped ; x:y
";
        let regs = parse_modbus_csv(csv).unwrap();
        let bits = &regs[0].bits;
        assert_eq!(bits.len(), 2);
        assert_eq!(bits[0], RegisterBit {
            bit: 0,
            key: "run".to_string(),
            name: "Running".to_string()
        });
        assert_eq!(bits[1].bit, 2);
    }

    #[test]
    fn invalid_numbers_parse_as_zero_address() {
        let csv = "name,key,address,length\nX,x,notanumber,1\n";
        let regs = parse_modbus_csv(csv).unwrap();
        assert_eq!(regs[0].address, 0);
    }

    #[test]
    fn empty_document_is_an_error() {
        assert!(parse_modbus_csv("").is_err());
    }

    #[test]
    fn render_parse_round_trip() {
        let regs = parse_modbus_csv(SAMPLE).unwrap();
        let rendered = render_modbus_csv(&regs);
        let reparsed = parse_modbus_csv(&rendered).unwrap();
        assert_eq!(regs, reparsed);
    }

    #[test]
    fn quoted_fields_survive() {
        let csv = "name,key,address,length\n\"Power, total\",p,1,2\n";
        let regs = parse_modbus_csv(csv).unwrap();
        assert_eq!(regs[0].name, "Power, total");
    }
}
