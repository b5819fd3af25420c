// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::collections::HashSet;

use strata_graph::{BoundEdge, Edge};

use crate::error::AlgebraError;

/// Records how an [`crate::EdgesBag`] was assembled, just enough to let
/// [`crate::EdgesBag::loopback`] map a decorator's outputs back onto the
/// original bag's own names.
///
/// This is a closed algebraic type by design: every [`crate::EdgesBag`]
/// operation that can be decorated afterwards produces one of these four
/// shapes, and `reverse` is total over them.
#[derive(Clone, Debug)]
pub enum Context {
    /// This bag cannot be decorated — there is nothing to reverse through.
    NoContext,
    /// Reversing is a no-op: requested names pass straight through.
    Identity,
    /// This bag's `outputs[i]` corresponds to the inner bag's
    /// `inputs[i]`. Names in `outputs` are rewritten to their
    /// corresponding `inputs` entry; everything else passes through
    /// unchanged only if `inherit` is set.
    Bag {
        inputs: Vec<String>,
        outputs: Vec<String>,
        inherit: bool,
    },
    /// The composition of two contexts, reversed right-to-left:
    /// `current`'s names are resolved first, then whatever they resolve
    /// to is resolved again through `previous`.
    Chain {
        previous: Box<Context>,
        current: Box<Context>,
    },
}

impl Context {
    pub fn chain(previous: Context, current: Context) -> Self {
        Self::Chain {
            previous: Box::new(previous),
            current: Box::new(current),
        }
    }

    /// Maps `outputs` — names in this bag's own namespace — back to the
    /// names and any stitching [`BoundEdge`]s needed to express them in
    /// terms of whatever this bag was built from.
    pub fn reverse(
        &self,
        outputs: Vec<String>,
    ) -> Result<(Vec<String>, Vec<BoundEdge>, HashSet<String>), AlgebraError> {
        match self {
            Self::NoContext => Err(AlgebraError::NoReverseContext),
            Self::Identity => Ok((outputs, Vec::new(), HashSet::new())),
            Self::Bag {
                inputs,
                outputs: bag_outputs,
                inherit,
            } => {
                let mut resolved = Vec::with_capacity(outputs.len());
                let mut edges = Vec::new();
                for name in outputs {
                    if let Some(pos) = bag_outputs.iter().position(|o| *o == name) {
                        let inner_name = inputs[pos].clone();
                        edges.push(BoundEdge::new(
                            Edge::Identity,
                            vec![inner_name.clone()],
                            name.clone(),
                        ));
                        resolved.push(inner_name);
                    } else if *inherit {
                        resolved.push(name);
                    } else {
                        return Err(AlgebraError::UnknownField { name });
                    }
                }
                Ok((resolved, edges, HashSet::new()))
            }
            Self::Chain { previous, current } => {
                let (mid, mut edges, mut optionals) = current.reverse(outputs)?;
                let (final_names, more_edges, more_optionals) = previous.reverse(mid)?;
                edges.extend(more_edges);
                optionals.extend(more_optionals);
                Ok((final_names, edges, optionals))
            }
        }
    }
}
