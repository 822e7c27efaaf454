//! Storage slot allocation.
//!
//! Each local label gets a slot index within its enclosing lambda (or the
//! top level). Lambdas are annotated with their argument count and the
//! number of slots they use; stream binders get a slot for the stream
//! state.

use std::collections::HashMap;

use crate::ast::{Codelet, LambdaCodelet};
use crate::error::Mishap;

#[derive(Debug, Default)]
struct SlotAllocator {
    allocated: HashMap<u64, u32>,
    next: u32,
}

/// Annotates a resolved tree in place.
pub fn allocate_slots(tree: &mut Codelet) -> Result<(), Mishap> {
    SlotAllocator::default().visit(tree)
}

impl SlotAllocator {
    fn fresh(&mut self) -> u32 {
        let slot = self.next;
        self.next += 1;
        slot
    }

    fn visit(&mut self, codelet: &mut Codelet) -> Result<(), Mishap> {
        match codelet {
            Codelet::Id(id) if id.is_local() => {
                let Some(label) = id.label else {
                    return Err(
                        Mishap::scope("Local variable has no label").culprit("name", &id.name)
                    );
                };
                let slot = match self.allocated.get(&label) {
                    Some(slot) => *slot,
                    None => {
                        let slot = self.fresh();
                        self.allocated.insert(label, slot);
                        slot
                    }
                };
                id.slot = Some(slot);
                Ok(())
            }
            Codelet::Lambda(lambda) => SlotAllocator::default().visit_lambda(lambda),
            Codelet::In {
                pattern,
                streamable,
                stream_slot,
            } => {
                self.visit(pattern)?;
                self.visit(streamable)?;
                *stream_slot = Some(self.fresh());
                Ok(())
            }
            other => {
                for member in other.members_mut() {
                    self.visit(member)?;
                }
                Ok(())
            }
        }
    }

    fn visit_lambda(mut self, lambda: &mut LambdaCodelet) -> Result<(), Mishap> {
        let nargs = count_parameters(&lambda.parameters)?;
        self.visit(&mut lambda.parameters)?;
        self.visit(&mut lambda.body)?;
        lambda.nargs = Some(nargs);
        lambda.nlocals = Some(self.next);
        Ok(())
    }
}

fn count_parameters(parameters: &Codelet) -> Result<u32, Mishap> {
    match parameters {
        Codelet::Id(_) => Ok(1),
        Codelet::Seq { body } => body.iter().map(count_parameters).sum(),
        other => {
            Err(Mishap::syntax("Unexpected parameter to function").culprit("kind", other.kind()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::name_resolve::{LabelCounter, resolve_tree};
    use crate::parser::parse;

    fn prepared(text: &str) -> Codelet {
        let tree = parse(text).unwrap().remove(0);
        let mut tree = resolve_tree(tree, &mut LabelCounter::new()).unwrap();
        allocate_slots(&mut tree).unwrap();
        tree
    }

    fn lambda_of(tree: &Codelet) -> &LambdaCodelet {
        match tree {
            Codelet::Binding { rhs, .. } => rhs.as_lambda().expect("lambda"),
            other => other.as_lambda().expect("lambda"),
        }
    }

    #[test]
    fn parameters_take_the_first_slots() {
        let tree = prepared("def f(a, b): c := a; c enddef");
        let lambda = lambda_of(&tree);
        assert_eq!(lambda.nargs, Some(2));
        assert_eq!(lambda.nlocals, Some(3));
        let mut slots = Vec::new();
        tree.walk(&mut |c| {
            if let Some(id) = c.as_id().filter(|id| id.is_local()) {
                slots.push((id.name.clone(), id.slot));
            }
        });
        assert_eq!(
            slots,
            vec![
                ("a".to_string(), Some(0)),
                ("b".to_string(), Some(1)),
                ("c".to_string(), Some(2)),
                ("a".to_string(), Some(0)),
                ("c".to_string(), Some(2)),
            ]
        );
    }

    #[test]
    fn globals_get_no_slot() {
        let tree = prepared("def f(): g enddef");
        let mut globals = Vec::new();
        tree.walk(&mut |c| globals.extend(c.as_id().filter(|id| id.is_global()).map(|id| id.slot)));
        assert_eq!(globals, vec![None, None]);
        assert_eq!(lambda_of(&tree).nlocals, Some(0));
    }

    #[test]
    fn nested_lambdas_count_from_zero() {
        let tree = prepared("def f(x): lambda y: y end enddef");
        let outer = lambda_of(&tree);
        let inner = outer.body.as_lambda().unwrap();
        assert_eq!(outer.nlocals, Some(1));
        assert_eq!(inner.nargs, Some(1));
        assert_eq!(inner.parameters.as_id().unwrap().slot, Some(0));
    }

    #[test]
    fn stream_binders_reserve_a_slot() {
        let tree = prepared("def f(xs): for i in xs do i endfor enddef");
        let lambda = lambda_of(&tree);
        assert_eq!(lambda.nlocals, Some(3));
        let Codelet::For { query, .. } = &*lambda.body else {
            panic!("expected for loop");
        };
        assert!(matches!(**query, Codelet::In { stream_slot: Some(2), .. }));
    }

    #[test]
    fn non_identifier_parameters_are_rejected() {
        let mut tree = Codelet::lambda(Codelet::int(1), Codelet::empty());
        let mishap = allocate_slots(&mut tree).unwrap_err();
        assert_eq!(mishap.message(), "Unexpected parameter to function");
    }
}
