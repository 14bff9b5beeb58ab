//! Mutation Translator: plain edits in, CRDT operations out.
//!
//! A [`Translator`] reads the current tree through a shared borrow of the
//! [`Model`] and appends operations to its own [`PatchBuilder`]. Nothing is
//! applied until the caller takes the patch with [`Translator::finish`], so a
//! failing statement leaves no trace.
//!
//! Composite values are converted bottom-up: the new map or sequence node
//! is created, its children are built and inserted into it, and only then is
//! it attached to the parent with a single `ins_obj` / `ins_arr`.

use serde_json::{Number, Value};

use crate::crdt::nodes::{ArrNode, CrdtNode, ObjNode};
use crate::crdt::Model;
use crate::crdt_patch::clock::Ts;
use crate::crdt_patch::constants::ORIGIN;
use crate::crdt_patch::patch::Patch;
use crate::crdt_patch::patch_builder::PatchBuilder;
use crate::error::DocError;

pub(crate) fn obj_node(model: &Model, id: Ts) -> Result<&ObjNode, DocError> {
    match model.get(&id) {
        Some(CrdtNode::Obj(node)) => Ok(node),
        Some(_) => Err(DocError::WrongType { expected: "a map" }),
        None => Err(DocError::NotFound),
    }
}

pub(crate) fn arr_node(model: &Model, id: Ts) -> Result<&ArrNode, DocError> {
    match model.get(&id) {
        Some(CrdtNode::Arr(node)) => Ok(node),
        Some(_) => Err(DocError::WrongType {
            expected: "a sequence",
        }),
        None => Err(DocError::NotFound),
    }
}

/// Node currently held by `key`, skipping the undefined tomb of a deleted key.
pub(crate) fn live_key(model: &Model, obj: &ObjNode, key: &str) -> Option<Ts> {
    obj.get(key).filter(|id| match model.get(id) {
        Some(CrdtNode::Con(con)) => !con.is_undefined(),
        Some(_) => true,
        None => false,
    })
}

pub struct Translator<'a> {
    model: &'a Model,
    builder: PatchBuilder,
}

impl<'a> Translator<'a> {
    /// The builder's clock starts at the model's clock so every new
    /// timestamp is ahead of everything the replica has observed.
    pub fn new(model: &'a Model) -> Self {
        Self {
            builder: PatchBuilder::new(model.clock.sid, model.clock.time),
            model,
        }
    }

    /// The operations produced so far.
    pub fn finish(mut self) -> Patch {
        self.builder.flush()
    }

    // ── Maps ──────────────────────────────────────────────────────────────

    /// `parent[key] = value`.
    pub fn set_property(&mut self, parent: Ts, key: &str, value: &Value) -> Result<(), DocError> {
        obj_node(self.model, parent)?;
        let child = self.build(value);
        self.builder.ins_obj(parent, vec![(key.to_owned(), child)]);
        Ok(())
    }

    /// `delete parent[key]`. Returns `false`, emitting nothing, when the key
    /// is already absent.
    pub fn delete_property(&mut self, parent: Ts, key: &str) -> Result<bool, DocError> {
        let node = obj_node(self.model, parent)?;
        if live_key(self.model, node, key).is_none() {
            return Ok(false);
        }
        let tomb = self.builder.con_undefined();
        self.builder.ins_obj(parent, vec![(key.to_owned(), tomb)]);
        Ok(true)
    }

    /// `parent[key] += by`, as a read-modify-write that emits one `set`.
    pub fn increment_property(
        &mut self,
        parent: Ts,
        key: &str,
        by: i64,
    ) -> Result<Value, DocError> {
        let node = obj_node(self.model, parent)?;
        let current = live_key(self.model, node, key).ok_or(DocError::NotFound)?;
        let next = add(self.read(current)?, by)?;
        self.set_property(parent, key, &next)?;
        Ok(next)
    }

    // ── Sequences ─────────────────────────────────────────────────────────

    /// Insert `values` so that the first of them ends up at `index`.
    pub fn seq_insert(&mut self, seq: Ts, index: usize, values: &[Value]) -> Result<(), DocError> {
        let node = arr_node(self.model, seq)?;
        let len = node.size();
        if index > len {
            return Err(DocError::OutOfBounds { index, len });
        }
        if values.is_empty() {
            return Ok(());
        }
        let after = if index == 0 {
            ORIGIN
        } else {
            node.find(index - 1)
                .ok_or(DocError::OutOfBounds { index, len })?
        };
        let ids: Vec<Ts> = values.iter().map(|v| self.build(v)).collect();
        self.builder.ins_arr(seq, after, ids);
        Ok(())
    }

    /// Remove `count` elements starting at `index`.
    pub fn seq_delete(&mut self, seq: Ts, index: usize, count: usize) -> Result<(), DocError> {
        let node = arr_node(self.model, seq)?;
        let len = node.size();
        if index.checked_add(count).map_or(true, |end| end > len) {
            return Err(DocError::OutOfBounds { index, len });
        }
        if count == 0 {
            return Ok(());
        }
        let spans = node.find_interval(index, count);
        self.builder.del(seq, spans);
        Ok(())
    }

    /// `seq[index] = value` for an existing index.
    pub fn seq_update(&mut self, seq: Ts, index: usize, value: &Value) -> Result<(), DocError> {
        let node = arr_node(self.model, seq)?;
        let slot = node.find(index).ok_or(DocError::OutOfBounds {
            index,
            len: node.size(),
        })?;
        let child = self.build(value);
        self.builder.upd_arr(seq, slot, child);
        Ok(())
    }

    pub fn sequence_push(&mut self, seq: Ts, value: &Value) -> Result<(), DocError> {
        let len = arr_node(self.model, seq)?.size();
        self.seq_insert(seq, len, std::slice::from_ref(value))
    }

    pub fn sequence_unshift(&mut self, seq: Ts, value: &Value) -> Result<(), DocError> {
        self.seq_insert(seq, 0, std::slice::from_ref(value))
    }

    /// Remove and return the last element; `None` on an empty sequence.
    pub fn sequence_pop(&mut self, seq: Ts) -> Result<Option<Value>, DocError> {
        let len = arr_node(self.model, seq)?.size();
        match len.checked_sub(1) {
            Some(last) => self.sequence_remove(seq, last).map(Some),
            None => Ok(None),
        }
    }

    /// Remove and return the first element; `None` on an empty sequence.
    pub fn sequence_shift(&mut self, seq: Ts) -> Result<Option<Value>, DocError> {
        if arr_node(self.model, seq)?.size() == 0 {
            return Ok(None);
        }
        self.sequence_remove(seq, 0).map(Some)
    }

    /// `seq[index] += by`, as a read-modify-write that emits one `upd_arr`.
    pub fn increment_element(&mut self, seq: Ts, index: usize, by: i64) -> Result<Value, DocError> {
        let node = arr_node(self.model, seq)?;
        let current = node.get_data_ts(index).ok_or(DocError::OutOfBounds {
            index,
            len: node.size(),
        })?;
        let next = add(self.read(current)?, by)?;
        self.seq_update(seq, index, &next)?;
        Ok(next)
    }

    /// Remove the element at `index` and return its value.
    pub fn sequence_remove(&mut self, seq: Ts, index: usize) -> Result<Value, DocError> {
        let node = arr_node(self.model, seq)?;
        let value_id = node.get_data_ts(index).ok_or(DocError::OutOfBounds {
            index,
            len: node.size(),
        })?;
        let value = self.read(value_id)?;
        self.seq_delete(seq, index, 1)?;
        Ok(value)
    }

    // ── Value conversion ──────────────────────────────────────────────────

    fn read(&self, id: Ts) -> Result<Value, DocError> {
        self.model.read(id).ok_or(DocError::NotFound)
    }

    /// Build the operations creating `value` and return the ID of its node.
    pub fn build(&mut self, value: &Value) -> Ts {
        match value {
            Value::Array(items) => {
                let arr = self.builder.arr();
                let ids: Vec<Ts> = items.iter().map(|item| self.build(item)).collect();
                self.builder.ins_arr(arr, ORIGIN, ids);
                arr
            }
            Value::Object(map) => {
                let obj = self.builder.obj();
                let pairs: Vec<(String, Ts)> = map
                    .iter()
                    .map(|(k, v)| (k.clone(), self.build(v)))
                    .collect();
                self.builder.ins_obj(obj, pairs);
                obj
            }
            primitive => self.builder.con_val(primitive.clone()),
        }
    }
}

fn add(current: Value, by: i64) -> Result<Value, DocError> {
    let Value::Number(n) = current else {
        return Err(DocError::NotANumber);
    };
    if let Some(sum) = n.as_i64().and_then(|i| i.checked_add(by)) {
        return Ok(Value::from(sum));
    }
    let sum = n.as_f64().ok_or(DocError::NotANumber)? + by as f64;
    Number::from_f64(sum)
        .map(Value::Number)
        .ok_or(DocError::NotANumber)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crdt_patch::operations::{ConValue, Op};
    use serde_json::json;

    fn apply(
        model: &mut Model,
        f: impl FnOnce(&mut Translator<'_>) -> Result<(), DocError>,
    ) -> Patch {
        let mut t = Translator::new(model);
        let result = f(&mut t);
        assert!(result.is_ok(), "{:?}", result);
        let patch = t.finish();
        model.apply_patch(&patch);
        patch
    }

    fn seq_fixture(items: Value) -> (Model, Ts) {
        let mut model = Model::new(70000);
        apply(&mut model, |t| t.set_property(ORIGIN, "list", &items));
        let list = obj_node(&model, ORIGIN)
            .ok()
            .and_then(|o| o.get("list"))
            .unwrap_or(ORIGIN);
        (model, list)
    }

    #[test]
    fn primitive_assignment_is_one_set() {
        let mut model = Model::new(70000);
        let patch = apply(&mut model, |t| t.set_property(ORIGIN, "name", &json!("Ann")));
        assert_eq!(patch.ops.len(), 2);
        assert!(matches!(patch.ops[0], Op::NewCon { .. }));
        assert!(matches!(&patch.ops[1], Op::InsObj { obj, .. } if *obj == ORIGIN));
        assert_eq!(model.view(), json!({"name": "Ann"}));
    }

    #[test]
    fn composite_assignment_attaches_last() {
        let mut model = Model::new(70000);
        let patch = apply(&mut model, |t| {
            t.set_property(ORIGIN, "deep", &json!({"a": [1, {"b": null}]}))
        });
        let last = patch.ops.last().map(|op| op.target());
        assert_eq!(last, Some(Some(ORIGIN)));
        let attaching = patch
            .ops
            .iter()
            .filter(|op| op.target() == Some(ORIGIN))
            .count();
        assert_eq!(attaching, 1);
        assert_eq!(model.view(), json!({"deep": {"a": [1, {"b": null}]}}));
    }

    #[test]
    fn empty_composites() {
        let mut model = Model::new(70000);
        apply(&mut model, |t| t.set_property(ORIGIN, "o", &json!({})));
        apply(&mut model, |t| t.set_property(ORIGIN, "a", &json!([])));
        assert_eq!(model.view(), json!({"o": {}, "a": []}));
    }

    #[test]
    fn delete_property_emits_tomb_once() {
        let mut model = Model::new(70000);
        apply(&mut model, |t| t.set_property(ORIGIN, "k", &json!(1)));
        let patch = apply(&mut model, |t| t.delete_property(ORIGIN, "k").map(|_| ()));
        assert!(matches!(
            &patch.ops[0],
            Op::NewCon {
                val: ConValue::Undefined,
                ..
            }
        ));
        assert_eq!(model.view(), json!({}));

        let mut t = Translator::new(&model);
        assert!(matches!(t.delete_property(ORIGIN, "k"), Ok(false)));
        assert!(t.finish().is_empty());
    }

    #[test]
    fn push_pop_shift_unshift() {
        let (mut model, list) = seq_fixture(json!([]));
        apply(&mut model, |t| t.sequence_push(list, &json!("apple")));
        assert_eq!(model.read(list), Some(json!(["apple"])));

        let (mut model, list) = seq_fixture(json!([1, 2, 3]));
        let mut popped = None;
        apply(&mut model, |t| {
            popped = t.sequence_pop(list)?;
            Ok(())
        });
        assert_eq!(popped, Some(json!(3)));
        assert_eq!(model.read(list), Some(json!([1, 2])));

        let (mut model, list) = seq_fixture(json!([1, 2, 3]));
        apply(&mut model, |t| t.sequence_shift(list).map(|_| ()));
        assert_eq!(model.read(list), Some(json!([2, 3])));

        let (mut model, list) = seq_fixture(json!([1, 2, 3]));
        apply(&mut model, |t| t.sequence_unshift(list, &json!(19)));
        assert_eq!(model.read(list), Some(json!([19, 1, 2, 3])));
    }

    #[test]
    fn pop_on_empty_emits_nothing() {
        let (model, list) = seq_fixture(json!([]));
        let mut t = Translator::new(&model);
        assert!(matches!(t.sequence_pop(list), Ok(None)));
        assert!(matches!(t.sequence_shift(list), Ok(None)));
        assert!(t.finish().is_empty());
    }

    #[test]
    fn insert_in_middle_and_update() {
        let (mut model, list) = seq_fixture(json!([1, 5]));
        apply(&mut model, |t| t.seq_insert(list, 1, &[json!(2), json!(3)]));
        apply(&mut model, |t| t.seq_update(list, 0, &json!({"x": 0})));
        assert_eq!(model.read(list), Some(json!([{"x": 0}, 2, 3, 5])));
    }

    #[test]
    fn out_of_bounds_is_reported() {
        let (model, list) = seq_fixture(json!([1]));
        let mut t = Translator::new(&model);
        assert!(matches!(
            t.seq_insert(list, 3, &[json!(0)]),
            Err(DocError::OutOfBounds { index: 3, len: 1 })
        ));
        assert!(matches!(
            t.seq_delete(list, 1, 1),
            Err(DocError::OutOfBounds { .. })
        ));
        assert!(matches!(
            t.seq_delete(list, 1, usize::MAX),
            Err(DocError::OutOfBounds { index: 1, len: 1 })
        ));
        assert!(matches!(
            t.seq_update(list, 1, &json!(0)),
            Err(DocError::OutOfBounds { .. })
        ));
        assert!(t.finish().is_empty());
    }

    #[test]
    fn increments() {
        let mut model = Model::new(70000);
        apply(&mut model, |t| t.set_property(ORIGIN, "n", &json!(4)));
        apply(&mut model, |t| t.increment_property(ORIGIN, "n", 1).map(|_| ()));
        assert_eq!(model.view(), json!({"n": 5}));

        apply(&mut model, |t| t.set_property(ORIGIN, "f", &json!(0.5)));
        apply(&mut model, |t| t.increment_property(ORIGIN, "f", 2).map(|_| ()));
        assert_eq!(model.view()["f"], json!(2.5));

        apply(&mut model, |t| t.set_property(ORIGIN, "s", &json!("x")));
        let mut t = Translator::new(&model);
        assert!(matches!(
            t.increment_property(ORIGIN, "s", 1),
            Err(DocError::NotANumber)
        ));
        assert!(matches!(
            t.increment_property(ORIGIN, "missing", 1),
            Err(DocError::NotFound)
        ));
    }

    #[test]
    fn increment_element_in_sequence() {
        let (mut model, list) = seq_fixture(json!([1, 41]));
        apply(&mut model, |t| t.increment_element(list, 1, 1).map(|_| ()));
        assert_eq!(model.read(list), Some(json!([1, 42])));
    }

    #[test]
    fn wrong_node_type() {
        let (model, list) = seq_fixture(json!([]));
        let mut t = Translator::new(&model);
        assert!(matches!(
            t.set_property(list, "k", &json!(1)),
            Err(DocError::WrongType { .. })
        ));
        assert!(matches!(
            t.sequence_push(ORIGIN, &json!(1)),
            Err(DocError::WrongType { .. })
        ));
    }
}
