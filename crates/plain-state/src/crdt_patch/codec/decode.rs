use serde_json::{Map, Value};

use super::DecodeError;
use crate::crdt_patch::clock::{ts, tss, Ts, Tss};
use crate::crdt_patch::constants::MAX_TIME;
use crate::crdt_patch::patch::Patch;
use crate::crdt_patch::patch_builder::PatchBuilder;

fn decode_id(v: &Value) -> Result<Ts, DecodeError> {
    match v.as_array().map(Vec::as_slice) {
        Some([sid, time]) => match (sid.as_u64(), time.as_u64()) {
            (Some(sid), Some(time)) if time <= MAX_TIME => Ok(ts(sid, time)),
            _ => Err(DecodeError::InvalidId(v.to_string())),
        },
        _ => Err(DecodeError::InvalidId(v.to_string())),
    }
}

fn decode_tss(v: &Value) -> Result<Tss, DecodeError> {
    match v.as_array().map(Vec::as_slice) {
        Some([sid, time, span]) => match (sid.as_u64(), time.as_u64(), span.as_u64()) {
            (Some(sid), Some(time), Some(span))
                if span > 0 && time.checked_add(span).is_some_and(|end| end <= MAX_TIME) =>
            {
                Ok(tss(sid, time, span))
            }
            _ => Err(DecodeError::InvalidId(v.to_string())),
        },
        _ => Err(DecodeError::InvalidId(v.to_string())),
    }
}

fn field<'a>(
    op_obj: &'a Map<String, Value>,
    op: &'static str,
    name: &str,
) -> Result<&'a Value, DecodeError> {
    op_obj.get(name).ok_or_else(|| DecodeError::InvalidOp {
        op,
        reason: format!("missing `{}`", name),
    })
}

fn array_field<'a>(
    op_obj: &'a Map<String, Value>,
    op: &'static str,
    name: &str,
) -> Result<&'a [Value], DecodeError> {
    let items = field(op_obj, op, name)?
        .as_array()
        .ok_or_else(|| DecodeError::InvalidOp {
            op,
            reason: format!("`{}` is not an array", name),
        })?;
    if items.is_empty() {
        return Err(DecodeError::InvalidOp {
            op,
            reason: format!("`{}` is empty", name),
        });
    }
    Ok(items)
}

/// Decodes a verbose-format JSON value into a [`Patch`].
/// Claim `span` IDs after `next`, failing once they run past [`MAX_TIME`].
fn reserve(next: &mut u64, span: u64, op: &'static str) -> Result<(), DecodeError> {
    match next.checked_add(span) {
        Some(end) if end <= MAX_TIME + 1 => {
            *next = end;
            Ok(())
        }
        _ => Err(DecodeError::InvalidOp {
            op,
            reason: "operation IDs overflow the clock".into(),
        }),
    }
}

pub fn decode(data: &Value) -> Result<Patch, DecodeError> {
    let obj = data.as_object().ok_or(DecodeError::InvalidPatch)?;
    let ops = obj
        .get("ops")
        .and_then(Value::as_array)
        .ok_or(DecodeError::InvalidPatch)?;
    let id_val = obj.get("id").ok_or(DecodeError::InvalidPatch)?;
    if id_val.is_null() {
        if ops.is_empty() {
            return Ok(Patch::new());
        }
        return Err(DecodeError::InvalidId(id_val.to_string()));
    }
    let id = decode_id(id_val)?;
    let mut builder = PatchBuilder::new(id.sid, id.time);
    let mut next = id.time;

    for op_val in ops {
        let op_obj = op_val.as_object().ok_or(DecodeError::InvalidPatch)?;
        let op_name = op_obj
            .get("op")
            .and_then(Value::as_str)
            .ok_or(DecodeError::InvalidPatch)?;

        match op_name {
            "new_con" => {
                reserve(&mut next, 1, "new_con")?;
                if op_obj.get("undefined").and_then(Value::as_bool) == Some(true) {
                    builder.con_undefined();
                } else {
                    let val = field(op_obj, "new_con", "value")?;
                    if val.is_array() || val.is_object() {
                        return Err(DecodeError::InvalidOp {
                            op: "new_con",
                            reason: "constant is not a primitive".into(),
                        });
                    }
                    builder.con_val(val.clone());
                }
            }
            "new_obj" => {
                reserve(&mut next, 1, "new_obj")?;
                builder.obj();
            }
            "new_arr" => {
                reserve(&mut next, 1, "new_arr")?;
                builder.arr();
            }
            "ins_obj" => {
                let obj = decode_id(field(op_obj, "ins_obj", "obj")?)?;
                let tuples = array_field(op_obj, "ins_obj", "value")?
                    .iter()
                    .map(|pair| match pair.as_array().map(Vec::as_slice) {
                        Some([Value::String(key), id]) => Ok((key.clone(), decode_id(id)?)),
                        _ => Err(DecodeError::InvalidOp {
                            op: "ins_obj",
                            reason: format!("bad entry {}", pair),
                        }),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                reserve(&mut next, 1, "ins_obj")?;
                builder.ins_obj(obj, tuples);
            }
            "ins_arr" => {
                let obj = decode_id(field(op_obj, "ins_arr", "obj")?)?;
                let after = decode_id(field(op_obj, "ins_arr", "after")?)?;
                let elems = array_field(op_obj, "ins_arr", "values")?
                    .iter()
                    .map(decode_id)
                    .collect::<Result<Vec<_>, _>>()?;
                reserve(&mut next, elems.len() as u64, "ins_arr")?;
                builder.ins_arr(obj, after, elems);
            }
            "upd_arr" => {
                let obj = decode_id(field(op_obj, "upd_arr", "obj")?)?;
                let after = decode_id(field(op_obj, "upd_arr", "ref")?)?;
                let val = decode_id(field(op_obj, "upd_arr", "value")?)?;
                reserve(&mut next, 1, "upd_arr")?;
                builder.upd_arr(obj, after, val);
            }
            "del" => {
                let obj = decode_id(field(op_obj, "del", "obj")?)?;
                let what = array_field(op_obj, "del", "what")?
                    .iter()
                    .map(decode_tss)
                    .collect::<Result<Vec<_>, _>>()?;
                reserve(&mut next, 1, "del")?;
                builder.del(obj, what);
            }
            "nop" => {
                let len = match op_obj.get("len") {
                    None => 1,
                    Some(v) => v.as_u64().filter(|len| *len > 0).ok_or_else(|| {
                        DecodeError::InvalidOp {
                            op: "nop",
                            reason: format!("bad length {}", v),
                        }
                    })?,
                };
                reserve(&mut next, len, "nop")?;
                builder.nop(len);
            }
            other => return Err(DecodeError::UnknownOp(other.to_owned())),
        }
    }

    Ok(builder.flush())
}
