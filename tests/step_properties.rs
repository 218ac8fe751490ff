mod common;
mod proptest_config;

use common::arb_doc;
use proptest::collection::vec;
use proptest::prelude::*;
use rich_doc::transform::{Assoc, Mappable};
use rich_doc::{basic, Node, Transform};

#[derive(Debug, Clone)]
enum Op {
    Delete(f64, f64),
    InsertText(f64),
    Strong(f64, f64),
    Copy(f64, f64, f64),
}

fn arb_op() -> impl Strategy<Value = Op> {
    let frac = || 0.0f64..=1.0;
    prop_oneof![
        3 => (frac(), frac()).prop_map(|(a, b)| Op::Delete(a, b)),
        2 => frac().prop_map(Op::InsertText),
        1 => (frac(), frac()).prop_map(|(a, b)| Op::Strong(a, b)),
        1 => (frac(), frac(), frac()).prop_map(|(a, b, c)| Op::Copy(a, b, c)),
    ]
}

fn at(doc: &Node, frac: f64) -> usize {
    (doc.content().size() as f64 * frac) as usize
}

fn ordered(doc: &Node, a: f64, b: f64) -> (usize, usize) {
    let (a, b) = (at(doc, a), at(doc, b));
    (a.min(b), a.max(b))
}

/// Applies `ops`, skipping any the document rejects.
fn run(doc: Node, ops: &[Op]) -> Transform {
    let schema = basic::schema();
    let strong = schema.mark("strong", None).unwrap();
    let mut tr = Transform::new(doc);
    for op in ops {
        let doc = tr.doc().clone();
        let _ = match *op {
            Op::Delete(a, b) => {
                let (from, to) = ordered(&doc, a, b);
                tr.delete(from, to).map(|_| ())
            }
            Op::InsertText(a) => tr.insert(at(&doc, a), schema.text("x", &[]).unwrap()).map(|_| ()),
            Op::Strong(a, b) => {
                let (from, to) = ordered(&doc, a, b);
                tr.add_mark(from, to, &strong).map(|_| ())
            }
            Op::Copy(a, b, c) => {
                let (from, to) = ordered(&doc, a, b);
                let slice = doc.slice(from, to).unwrap();
                let pos = at(&doc, c);
                tr.replace(pos, pos, &slice).map(|_| ())
            }
        };
    }
    tr
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(proptest_config::cases()))]
    #[test]
    fn prop_every_intermediate_doc_is_valid(doc in arb_doc(), ops in vec(arb_op(), 1..6)) {
        let tr = run(doc, &ops);
        prop_assert_eq!(tr.docs().len(), tr.steps().len());
        for d in tr.docs() {
            prop_assert!(d.check().is_ok());
        }
        prop_assert!(tr.doc().check().is_ok());
    }

    #[test]
    fn prop_inverted_steps_restore_previous_doc(doc in arb_doc(), ops in vec(arb_op(), 1..6)) {
        let tr = run(doc, &ops);
        for (i, step) in tr.steps().iter().enumerate() {
            let before = &tr.docs()[i];
            let after = tr.docs().get(i + 1).unwrap_or(tr.doc());
            let inverse = step.invert(before).unwrap();
            let restored = inverse.apply(after);
            prop_assert_eq!(restored.doc(), Some(before), "step {} {:?}", i, step);
        }
    }

    #[test]
    fn prop_surviving_positions_map_back(doc in arb_doc(), ops in vec(arb_op(), 1..6)) {
        let tr = run(doc, &ops);
        let back = tr.mapping().invert();
        for pos in 0..=tr.before().content().size() {
            let forward = tr.mapping().map_result(pos, Assoc::After);
            if forward.deleted() {
                continue;
            }
            prop_assert!(forward.pos <= tr.doc().content().size());
            prop_assert_eq!(back.map(forward.pos, Assoc::After), pos);
        }
    }
}

#[test]
fn test_step_map_matches_size_change() {
    let doc = common::doc(vec![common::p("abc"), common::p("def")]);
    let tr = run(doc, &[Op::Delete(0.2, 0.7), Op::InsertText(0.5)]);
    for (i, step) in tr.steps().iter().enumerate() {
        let before = tr.docs()[i].content().size();
        let after = tr.docs().get(i + 1).unwrap_or(tr.doc()).content().size();
        assert_eq!(step.get_map().map(before, Assoc::After), after);
    }
}
