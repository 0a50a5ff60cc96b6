//! Object protocol operations
//!
//! Each operation snapshots what it needs under the heap lock and then works
//! on the snapshot with the lock released, so nested objects can be visited.
//! Results are plain [`EngineResult`]s; the trait layer turns them into
//! pending errors.

use std::cmp::Ordering;

use tether_sdk::{BinaryOp, CompareOp, ForeignRuntime, RawObject, UnaryOp};

use super::Engine;
use crate::error::{EngineError, EngineResult};
use crate::number::IntValue;
use crate::object::{format_float, quote_str, ObjectData};

/// Nesting depth at which comparisons give up
const MAX_COMPARE_DEPTH: usize = 256;

/// Value snapshot of one operand
enum Operand {
    Int(IntValue),
    Float(f64),
    Str(String),
    Tuple(Vec<RawObject>),
    List(Vec<RawObject>),
    Dict(Vec<(RawObject, RawObject)>),
    Other,
}

impl Operand {
    fn as_f64(&self) -> Option<f64> {
        match self {
            Operand::Int(value) => Some(value.to_f64()),
            Operand::Float(value) => Some(*value),
            _ => None,
        }
    }
}

/// Result of an item lookup
#[derive(Debug)]
pub(super) enum Fetched {
    /// Borrowed item of a container
    Existing(RawObject),
    /// Freshly computed value
    New(ObjectData),
}

enum Subscript {
    Seq(&'static str, Vec<RawObject>),
    Str(String),
    Dict(Vec<(RawObject, RawObject)>),
    Unsupported(&'static str),
}

fn normalize_index(index: i128, len: usize, what: &'static str) -> EngineResult<usize> {
    let len = len as i128;
    let index = if index < 0 { index + len } else { index };
    if (0..len).contains(&index) {
        Ok(index as usize)
    } else {
        Err(EngineError::Index(what))
    }
}

fn unary_symbol(op: UnaryOp) -> &'static str {
    match op {
        UnaryOp::Negative => "unary -",
        UnaryOp::Positive => "unary +",
        UnaryOp::Absolute => "abs()",
        UnaryOp::Invert => "unary ~",
    }
}

fn int_binary(op: BinaryOp, x: IntValue, y: IntValue) -> EngineResult<ObjectData> {
    let value = match op {
        BinaryOp::Add => x.add(y)?,
        BinaryOp::Subtract => x.sub(y)?,
        BinaryOp::Multiply => x.mul(y)?,
        BinaryOp::TrueDivide => {
            if y.is_zero() {
                return Err(EngineError::ZeroDivision("division by zero"));
            }
            return Ok(ObjectData::Float(x.to_f64() / y.to_f64()));
        }
        BinaryOp::FloorDivide => x.floor_div(y)?,
        BinaryOp::Remainder => x.rem(y)?,
        BinaryOp::And => x.bitwise(y, |a, b| a & b)?,
        BinaryOp::Or => x.bitwise(y, |a, b| a | b)?,
        BinaryOp::Xor => x.bitwise(y, |a, b| a ^ b)?,
        BinaryOp::LeftShift => x.shl(y)?,
        BinaryOp::RightShift => x.shr(y)?,
    };
    Ok(ObjectData::Int(value))
}

fn repeat_count(count: IntValue, unit: usize) -> EngineResult<usize> {
    if count.is_negative() {
        return Ok(0);
    }
    usize::try_from(count.magnitude())
        .ok()
        .filter(|count| count.checked_mul(unit).map_or(false, |total| total <= isize::MAX as usize))
        .ok_or_else(|| EngineError::Overflow("repeated string is too long".to_string()))
}

impl Engine {
    fn type_name_of(&self, obj: RawObject) -> &'static str {
        self.data(obj, ObjectData::type_name)
    }

    fn operand(&self, obj: RawObject) -> Operand {
        self.data(obj, |data| match data {
            ObjectData::Float(value) => Operand::Float(*value),
            ObjectData::Str(text) => Operand::Str(text.clone()),
            ObjectData::Tuple(items) => Operand::Tuple(items.iter().flatten().copied().collect()),
            ObjectData::List(items) => Operand::List(items.clone()),
            ObjectData::Dict(entries) => Operand::Dict(entries.clone()),
            other => other.as_int().map_or(Operand::Other, Operand::Int),
        })
    }

    // ========================================================================
    // Repr and Str
    // ========================================================================

    /// `repr(obj)`
    pub(super) fn repr_of(&self, obj: RawObject) -> String {
        let mut visiting = Vec::new();
        self.repr_inner(obj, &mut visiting)
    }

    /// `str(obj)`: strings as-is, everything else as its repr
    pub(super) fn str_of(&self, obj: RawObject) -> String {
        let text = self.data(obj, |data| match data {
            ObjectData::Str(text) => Some(text.clone()),
            _ => None,
        });
        text.unwrap_or_else(|| self.repr_of(obj))
    }

    fn repr_inner(&self, obj: RawObject, visiting: &mut Vec<RawObject>) -> String {
        enum View {
            Text(String),
            Seq(&'static str, &'static str, Vec<RawObject>),
            Dict(Vec<(RawObject, RawObject)>),
            Namespace(Vec<(String, RawObject)>),
        }

        let view = self.data(obj, |data| match data {
            ObjectData::None => View::Text("None".to_string()),
            ObjectData::Bool(true) => View::Text("True".to_string()),
            ObjectData::Bool(false) => View::Text("False".to_string()),
            ObjectData::Int(value) => View::Text(value.to_string()),
            ObjectData::Float(value) => View::Text(format_float(*value)),
            ObjectData::Str(text) => View::Text(quote_str(text)),
            ObjectData::Tuple(items) => View::Seq("(", ")", items.iter().flatten().copied().collect()),
            ObjectData::List(items) => View::Seq("[", "]", items.clone()),
            ObjectData::Dict(entries) => View::Dict(entries.clone()),
            ObjectData::Namespace(attrs) => {
                let mut attrs: Vec<_> = attrs.iter().map(|(name, value)| (name.clone(), *value)).collect();
                attrs.sort_by(|a, b| a.0.cmp(&b.0));
                View::Namespace(attrs)
            }
            ObjectData::Capsule(_) => View::Text(format!("<capsule object at {:#x}>", obj.to_bits())),
            ObjectData::Instance(instance) => {
                View::Text(format!("<{} object at {:#x}>", instance.name, obj.to_bits()))
            }
        });

        let (open, close) = match &view {
            View::Text(text) => return text.clone(),
            View::Seq(open, close, _) => (*open, *close),
            View::Dict(_) => ("{", "}"),
            View::Namespace(_) => ("namespace(", ")"),
        };

        // Self-containing containers.
        if visiting.contains(&obj) {
            return format!("{}...{}", open, close);
        }

        visiting.push(obj);
        let parts: Vec<String> = match view {
            View::Seq(_, _, items) => items.iter().map(|item| self.repr_inner(*item, visiting)).collect(),
            View::Dict(entries) => entries
                .iter()
                .map(|(key, value)| {
                    let key = self.repr_inner(*key, visiting);
                    format!("{}: {}", key, self.repr_inner(*value, visiting))
                })
                .collect(),
            View::Namespace(attrs) => attrs
                .iter()
                .map(|(name, value)| format!("{}={}", name, self.repr_inner(*value, visiting)))
                .collect(),
            View::Text(_) => Vec::new(),
        };
        visiting.pop();

        if open == "(" && parts.len() == 1 {
            format!("({},)", parts[0])
        } else {
            format!("{}{}{}", open, parts.join(", "), close)
        }
    }

    // ========================================================================
    // Comparison
    // ========================================================================

    /// Value equality
    pub(super) fn equals(&self, a: RawObject, b: RawObject) -> EngineResult<bool> {
        self.equals_at(a, b, 0)
    }

    fn equals_at(&self, a: RawObject, b: RawObject, depth: usize) -> EngineResult<bool> {
        if a == b {
            return Ok(true);
        }
        if depth >= MAX_COMPARE_DEPTH {
            return Err(EngineError::Recursion("comparison"));
        }
        match (self.operand(a), self.operand(b)) {
            (Operand::Int(x), Operand::Int(y)) => Ok(x == y),
            (Operand::Int(x), Operand::Float(y)) | (Operand::Float(y), Operand::Int(x)) => {
                Ok(IntValue::from_f64(y) == Some(x))
            }
            (Operand::Float(x), Operand::Float(y)) => Ok(x == y),
            (Operand::Str(x), Operand::Str(y)) => Ok(x == y),
            (Operand::Tuple(x), Operand::Tuple(y)) | (Operand::List(x), Operand::List(y)) => {
                if x.len() != y.len() {
                    return Ok(false);
                }
                for (p, q) in x.iter().zip(&y) {
                    if !self.equals_at(*p, *q, depth + 1)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            (Operand::Dict(x), Operand::Dict(y)) => {
                if x.len() != y.len() {
                    return Ok(false);
                }
                for (key, value) in &x {
                    let Some(position) = self.find_key_at(&y, *key, depth + 1)? else {
                        return Ok(false);
                    };
                    if !self.equals_at(*value, y[position].1, depth + 1)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Position of `key` among dict entries
    fn find_key(&self, entries: &[(RawObject, RawObject)], key: RawObject) -> EngineResult<Option<usize>> {
        self.find_key_at(entries, key, 0)
    }

    fn find_key_at(
        &self,
        entries: &[(RawObject, RawObject)],
        key: RawObject,
        depth: usize,
    ) -> EngineResult<Option<usize>> {
        for (position, (candidate, _)) in entries.iter().enumerate() {
            if self.equals_at(*candidate, key, depth)? {
                return Ok(Some(position));
            }
        }
        Ok(None)
    }

    fn order(&self, a: RawObject, b: RawObject, op: CompareOp, depth: usize) -> EngineResult<Option<Ordering>> {
        if depth >= MAX_COMPARE_DEPTH {
            return Err(EngineError::Recursion("comparison"));
        }
        match (self.operand(a), self.operand(b)) {
            (Operand::Int(x), Operand::Int(y)) => Ok(Some(x.cmp(&y))),
            (Operand::Int(x), Operand::Float(y)) => Ok(x.to_f64().partial_cmp(&y)),
            (Operand::Float(x), Operand::Int(y)) => Ok(x.partial_cmp(&y.to_f64())),
            (Operand::Float(x), Operand::Float(y)) => Ok(x.partial_cmp(&y)),
            (Operand::Str(x), Operand::Str(y)) => Ok(Some(x.cmp(&y))),
            (Operand::Tuple(x), Operand::Tuple(y)) | (Operand::List(x), Operand::List(y)) => {
                // The first differing item decides; otherwise the shorter is smaller.
                for (p, q) in x.iter().zip(&y) {
                    if !self.equals_at(*p, *q, depth + 1)? {
                        return self.order(*p, *q, op, depth + 1);
                    }
                }
                Ok(Some(x.len().cmp(&y.len())))
            }
            _ => Err(EngineError::Type(format!(
                "'{}' not supported between instances of '{}' and '{}'",
                op.symbol(),
                self.type_name_of(a),
                self.type_name_of(b)
            ))),
        }
    }

    /// Rich comparison
    pub(super) fn compare(&self, a: RawObject, b: RawObject, op: CompareOp) -> EngineResult<bool> {
        match op {
            CompareOp::Eq => return self.equals(a, b),
            CompareOp::Ne => return self.equals(a, b).map(|equal| !equal),
            _ => {}
        }

        // Unordered floats compare false.
        let ordering = self.order(a, b, op, 0)?;
        Ok(ordering.map_or(false, |ordering| match op {
            CompareOp::Lt => ordering == Ordering::Less,
            CompareOp::Le => ordering != Ordering::Greater,
            CompareOp::Gt => ordering == Ordering::Greater,
            CompareOp::Ge => ordering != Ordering::Less,
            CompareOp::Eq => ordering == Ordering::Equal,
            CompareOp::Ne => ordering != Ordering::Equal,
        }))
    }

    // ========================================================================
    // Arithmetic
    // ========================================================================

    fn unsupported(&self, op: BinaryOp, a: RawObject, b: RawObject) -> EngineError {
        EngineError::Type(format!(
            "unsupported operand type(s) for {}: '{}' and '{}'",
            op.symbol(),
            self.type_name_of(a),
            self.type_name_of(b)
        ))
    }

    fn float_binary(&self, op: BinaryOp, a: RawObject, b: RawObject, x: f64, y: f64) -> EngineResult<ObjectData> {
        let value = match op {
            BinaryOp::Add => x + y,
            BinaryOp::Subtract => x - y,
            BinaryOp::Multiply => x * y,
            BinaryOp::TrueDivide => {
                if y == 0.0 {
                    return Err(EngineError::ZeroDivision("float division by zero"));
                }
                x / y
            }
            BinaryOp::FloorDivide => {
                if y == 0.0 {
                    return Err(EngineError::ZeroDivision("float floor division by zero"));
                }
                (x / y).floor()
            }
            BinaryOp::Remainder => {
                if y == 0.0 {
                    return Err(EngineError::ZeroDivision("float modulo"));
                }
                // The remainder takes the divisor's sign.
                let remainder = x % y;
                if remainder != 0.0 && (remainder < 0.0) != (y < 0.0) {
                    remainder + y
                } else {
                    remainder
                }
            }
            _ => return Err(self.unsupported(op, a, b)),
        };
        Ok(ObjectData::Float(value))
    }

    /// Binary number protocol. Container results borrow their items.
    pub(super) fn binary(&self, op: BinaryOp, a: RawObject, b: RawObject) -> EngineResult<ObjectData> {
        let lhs = self.operand(a);
        let rhs = self.operand(b);

        if let (Operand::Int(x), Operand::Int(y)) = (&lhs, &rhs) {
            return int_binary(op, *x, *y);
        }
        if let (Some(x), Some(y)) = (lhs.as_f64(), rhs.as_f64()) {
            return self.float_binary(op, a, b, x, y);
        }

        match (op, lhs, rhs) {
            (BinaryOp::Add, Operand::Str(x), Operand::Str(y)) => Ok(ObjectData::Str(x + &y)),
            (BinaryOp::Multiply, Operand::Str(text), Operand::Int(count))
            | (BinaryOp::Multiply, Operand::Int(count), Operand::Str(text)) => {
                let count = repeat_count(count, text.len())?;
                Ok(ObjectData::Str(text.repeat(count)))
            }
            (BinaryOp::Add, Operand::Tuple(x), Operand::Tuple(y)) => {
                Ok(ObjectData::Tuple(x.into_iter().chain(y).map(Some).collect()))
            }
            (BinaryOp::Add, Operand::List(x), Operand::List(y)) => {
                Ok(ObjectData::List(x.into_iter().chain(y).collect()))
            }
            _ => Err(self.unsupported(op, a, b)),
        }
    }

    /// Unary number protocol
    pub(super) fn unary(&self, op: UnaryOp, a: RawObject) -> EngineResult<ObjectData> {
        match (op, self.operand(a)) {
            (UnaryOp::Negative, Operand::Int(x)) => Ok(ObjectData::Int(x.neg())),
            (UnaryOp::Positive, Operand::Int(x)) => Ok(ObjectData::Int(x)),
            (UnaryOp::Absolute, Operand::Int(x)) => Ok(ObjectData::Int(x.abs())),
            (UnaryOp::Invert, Operand::Int(x)) => Ok(ObjectData::Int(x.invert()?)),
            (UnaryOp::Negative, Operand::Float(x)) => Ok(ObjectData::Float(-x)),
            (UnaryOp::Positive, Operand::Float(x)) => Ok(ObjectData::Float(x)),
            (UnaryOp::Absolute, Operand::Float(x)) => Ok(ObjectData::Float(x.abs())),
            _ => Err(EngineError::Type(format!(
                "bad operand type for {}: '{}'",
                unary_symbol(op),
                self.type_name_of(a)
            ))),
        }
    }

    // ========================================================================
    // Length and Items
    // ========================================================================

    /// `len(obj)`
    pub(super) fn length(&self, obj: RawObject) -> EngineResult<usize> {
        self.data(obj, |data| match data {
            ObjectData::Tuple(items) => Ok(items.len()),
            ObjectData::List(items) => Ok(items.len()),
            ObjectData::Dict(entries) => Ok(entries.len()),
            ObjectData::Str(text) => Ok(text.chars().count()),
            other => Err(EngineError::Type(format!(
                "object of type '{}' has no len()",
                other.type_name()
            ))),
        })
    }

    /// Length of a sequence
    pub(super) fn sequence_len(&self, obj: RawObject) -> EngineResult<usize> {
        let (kind, type_name) = self.data(obj, |data| (data.kind(), data.type_name()));
        if !kind.is_sequence() {
            return Err(EngineError::Type(format!("'{}' object is not a sequence", type_name)));
        }
        self.length(obj)
    }

    fn subscript(&self, obj: RawObject) -> Subscript {
        self.data(obj, |data| match data {
            ObjectData::Tuple(_) | ObjectData::List(_) => {
                Subscript::Seq(data.type_name(), data.as_sequence().unwrap_or_default())
            }
            ObjectData::Str(text) => Subscript::Str(text.clone()),
            ObjectData::Dict(entries) => Subscript::Dict(entries.clone()),
            other => Subscript::Unsupported(other.type_name()),
        })
    }

    fn index_arg(&self, key: RawObject, what: &'static str) -> EngineResult<i128> {
        match self.data(key, ObjectData::as_int) {
            Some(index) => index.to_i128().ok_or(EngineError::Index(what)),
            None => Err(EngineError::Type(format!(
                "{} indices must be integers, not '{}'",
                what,
                self.type_name_of(key)
            ))),
        }
    }

    fn item_at(&self, subscript: Subscript, index: i128) -> EngineResult<Fetched> {
        match subscript {
            Subscript::Seq(what, items) => {
                let index = normalize_index(index, items.len(), what)?;
                Ok(Fetched::Existing(items[index]))
            }
            Subscript::Str(text) => {
                let chars: Vec<char> = text.chars().collect();
                let index = normalize_index(index, chars.len(), "string")?;
                Ok(Fetched::New(ObjectData::Str(chars[index].to_string())))
            }
            Subscript::Dict(_) | Subscript::Unsupported(_) => Err(EngineError::Type(
                "object does not support positional access".to_string(),
            )),
        }
    }

    /// `obj[key]`
    pub(super) fn get_item_of(&self, obj: RawObject, key: RawObject) -> EngineResult<Fetched> {
        match self.subscript(obj) {
            subscript @ Subscript::Seq(what, _) => {
                let index = self.index_arg(key, what)?;
                self.item_at(subscript, index)
            }
            subscript @ Subscript::Str(_) => {
                let index = self.index_arg(key, "string")?;
                self.item_at(subscript, index)
            }
            Subscript::Dict(entries) => match self.find_key(&entries, key)? {
                Some(position) => Ok(Fetched::Existing(entries[position].1)),
                None => Err(EngineError::Key(self.repr_of(key))),
            },
            Subscript::Unsupported(type_name) => Err(EngineError::Type(format!(
                "'{}' object is not subscriptable",
                type_name
            ))),
        }
    }

    /// Sequence item by position
    pub(super) fn sequence_item(&self, obj: RawObject, index: usize) -> EngineResult<Fetched> {
        self.sequence_len(obj)?;
        self.item_at(self.subscript(obj), index as i128)
    }

    /// `obj[key] = value`
    pub(super) fn set_item_of(&self, obj: RawObject, key: RawObject, value: RawObject) -> EngineResult<()> {
        match self.subscript(obj) {
            Subscript::Seq("list", items) => {
                let index = normalize_index(self.index_arg(key, "list")?, items.len(), "list assignment")?;
                self.inc_ref(value);
                let old = self.data_mut(obj, |data| match data {
                    ObjectData::List(items) => items.get_mut(index).map(|slot| std::mem::replace(slot, value)),
                    _ => None,
                });
                self.dec_ref(old.unwrap_or(value));
                Ok(())
            }
            Subscript::Dict(entries) => {
                let position = self.find_key(&entries, key)?;
                self.inc_ref(value);
                match position {
                    Some(position) => {
                        let old = self.data_mut(obj, |data| match data {
                            ObjectData::Dict(entries) => entries
                                .get_mut(position)
                                .map(|entry| std::mem::replace(&mut entry.1, value)),
                            _ => None,
                        });
                        self.dec_ref(old.unwrap_or(value));
                    }
                    None => {
                        self.inc_ref(key);
                        self.data_mut(obj, |data| {
                            if let ObjectData::Dict(entries) = data {
                                entries.push((key, value));
                            }
                        });
                    }
                }
                Ok(())
            }
            Subscript::Seq(type_name, _) | Subscript::Unsupported(type_name) => Err(EngineError::Type(format!(
                "'{}' object does not support item assignment",
                type_name
            ))),
            Subscript::Str(_) => Err(EngineError::Type(
                "'str' object does not support item assignment".to_string(),
            )),
        }
    }

    // ========================================================================
    // Attributes
    // ========================================================================

    /// Name carried by an attribute-name object
    pub(super) fn attr_name(&self, name: RawObject) -> EngineResult<String> {
        let text = self.data(name, |data| match data {
            ObjectData::Str(text) => Some(text.clone()),
            _ => None,
        });
        text.ok_or_else(|| {
            EngineError::Type(format!(
                "attribute name must be string, not '{}'",
                self.type_name_of(name)
            ))
        })
    }

    /// Attribute lookup. Only namespaces carry attributes.
    pub(super) fn get_attr_named(&self, obj: RawObject, name: &str) -> EngineResult<RawObject> {
        let found = self.data(obj, |data| match data {
            ObjectData::Namespace(attrs) => attrs.get(name).copied(),
            _ => None,
        });
        found.ok_or_else(|| EngineError::Attribute {
            type_name: self.type_name_of(obj).to_string(),
            name: name.to_string(),
        })
    }

    /// Attribute assignment, acquiring a reference to `value`
    pub(super) fn set_attr_named(&self, obj: RawObject, name: &str, value: RawObject) -> EngineResult<()> {
        self.inc_ref(value);
        let result = self.data_mut(obj, |data| match data {
            ObjectData::Namespace(attrs) => Ok(attrs.insert(name.to_string(), value)),
            other => Err(other.type_name()),
        });

        match result {
            Ok(old) => {
                if let Some(old) = old {
                    self.dec_ref(old);
                }
                Ok(())
            }
            Err(type_name) => {
                self.dec_ref(value);
                Err(EngineError::Attribute {
                    type_name: type_name.to_string(),
                    name: name.to_string(),
                })
            }
        }
    }
}
