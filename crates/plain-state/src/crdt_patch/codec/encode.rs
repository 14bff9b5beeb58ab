use serde_json::{json, Value};

use crate::crdt_patch::clock::{Ts, Tss};
use crate::crdt_patch::operations::{ConValue, Op};
use crate::crdt_patch::patch::Patch;

fn encode_ts(id: Ts) -> Value {
    json!([id.sid, id.time])
}

fn encode_tss(tss: &Tss) -> Value {
    json!([tss.sid, tss.time, tss.span])
}

/// Encodes a [`Patch`] into the verbose JSON format.
///
/// An empty patch encodes with a `null` id.
pub fn encode(patch: &Patch) -> Value {
    let ops: Vec<Value> = patch.ops.iter().map(encode_op).collect();
    let id = match patch.get_id() {
        Some(id) => encode_ts(id),
        None => Value::Null,
    };
    json!({ "id": id, "ops": ops })
}

fn encode_op(op: &Op) -> Value {
    match op {
        Op::NewCon { val, .. } => match val {
            ConValue::Undefined => json!({"op": "new_con", "undefined": true}),
            ConValue::Val(v) => json!({"op": "new_con", "value": v}),
        },
        Op::NewObj { .. } => json!({"op": "new_obj"}),
        Op::NewArr { .. } => json!({"op": "new_arr"}),
        Op::InsObj { obj, data, .. } => {
            let vals: Vec<Value> = data.iter().map(|(k, v)| json!([k, encode_ts(*v)])).collect();
            json!({"op": "ins_obj", "obj": encode_ts(*obj), "value": vals})
        }
        Op::InsArr {
            obj, after, data, ..
        } => {
            let vals: Vec<Value> = data.iter().map(|v| encode_ts(*v)).collect();
            json!({
                "op": "ins_arr",
                "obj": encode_ts(*obj),
                "after": encode_ts(*after),
                "values": vals
            })
        }
        Op::UpdArr {
            obj, after, val, ..
        } => json!({
            "op": "upd_arr",
            "obj": encode_ts(*obj),
            "ref": encode_ts(*after),
            "value": encode_ts(*val),
        }),
        Op::Del { obj, what, .. } => {
            let spans: Vec<Value> = what.iter().map(encode_tss).collect();
            json!({"op": "del", "obj": encode_ts(*obj), "what": spans})
        }
        Op::Nop { len, .. } => {
            if *len > 1 {
                json!({"op": "nop", "len": len})
            } else {
                json!({"op": "nop"})
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crdt_patch::clock::ts;
    use crate::crdt_patch::constants::ORIGIN;
    use crate::crdt_patch::patch_builder::PatchBuilder;

    #[test]
    fn empty_patch_has_null_id() {
        assert_eq!(encode(&Patch::new()), json!({"id": null, "ops": []}));
    }

    #[test]
    fn encodes_key_assignment() {
        let mut b = PatchBuilder::new(70001, 5);
        let v = b.con_val(json!("apple"));
        b.ins_obj(ORIGIN, vec![("name".into(), v)]);
        let encoded = encode(&b.flush());
        assert_eq!(
            encoded,
            json!({
                "id": [70001, 5],
                "ops": [
                    {"op": "new_con", "value": "apple"},
                    {"op": "ins_obj", "obj": [0, 0], "value": [["name", [70001, 5]]]}
                ]
            })
        );
    }

    #[test]
    fn encodes_undefined_and_del() {
        let mut b = PatchBuilder::new(3, 1);
        b.con_undefined();
        b.del(ts(3, 0), vec![crate::crdt_patch::clock::tss(3, 0, 2)]);
        let encoded = encode(&b.flush());
        assert_eq!(encoded["ops"][0], json!({"op": "new_con", "undefined": true}));
        assert_eq!(
            encoded["ops"][1],
            json!({"op": "del", "obj": [3, 0], "what": [[3, 0, 2]]})
        );
    }
}
