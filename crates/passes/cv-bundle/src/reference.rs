//! Reference semantics for bundle variants.
//!
//! [`VariantFns`] runs declared and synthesized variants over concrete
//! values. Synthesized variants execute their [`Step`] list against the
//! declared implementations, so two variants can be compared by the values
//! they produce.

use cv_cfg::Convention;
use thiserror::Error;

use crate::synthesis::{Step, VariantImpl};

/// Failure to evaluate a variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EvalError {
    /// The variant relies on an implementation that was not supplied
    #[error("no `{0}` implementation supplied")]
    MissingImplementation(Convention),

    /// The variant provides a different convention than the one applied
    #[error("variant provides `{provided}`, applied as `{applied}`")]
    ConventionMismatch {
        /// Convention the variant provides
        provided: Convention,
        /// Convention it was applied as
        applied: Convention,
    },

    /// A step read a value that an earlier step did not produce
    #[error("step {0:?} has no value to work on")]
    MissingValue(Step),
}

type LetFn<'f, V> = Box<dyn Fn(&V) -> V + 'f>;
type InoutFn<'f, V> = Box<dyn Fn(&mut V) + 'f>;
type SinkFn<'f, V> = Box<dyn Fn(V) -> V + 'f>;

/// Declared implementations of one bundle over values of type `V`
pub struct VariantFns<'f, V> {
    let_: Option<LetFn<'f, V>>,
    inout: Option<InoutFn<'f, V>>,
    sink: Option<SinkFn<'f, V>>,
}

impl<V> Default for VariantFns<'_, V> {
    fn default() -> Self {
        Self {
            let_: None,
            inout: None,
            sink: None,
        }
    }
}

/// Registers of the step machine
struct Machine<V> {
    receiver: Option<V>,
    local: Option<V>,
    result: Option<V>,
}

impl<'f, V: Clone> VariantFns<'f, V> {
    /// No declared implementations.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Supplies the `let` implementation.
    #[must_use]
    pub fn with_let(mut self, f: impl Fn(&V) -> V + 'f) -> Self {
        self.let_ = Some(Box::new(f));
        self
    }

    /// Supplies the `inout` implementation.
    #[must_use]
    pub fn with_inout(mut self, f: impl Fn(&mut V) + 'f) -> Self {
        self.inout = Some(Box::new(f));
        self
    }

    /// Supplies the `sink` implementation.
    #[must_use]
    pub fn with_sink(mut self, f: impl Fn(V) -> V + 'f) -> Self {
        self.sink = Some(Box::new(f));
        self
    }

    fn check(variant: VariantImpl, applied: Convention) -> Result<(), EvalError> {
        let provided = variant.convention();
        if provided == applied {
            Ok(())
        } else {
            Err(EvalError::ConventionMismatch { provided, applied })
        }
    }

    fn invoke_let(&self, receiver: &V) -> Result<V, EvalError> {
        let f = self
            .let_
            .as_ref()
            .ok_or(EvalError::MissingImplementation(Convention::Let))?;
        Ok(f(receiver))
    }

    fn invoke_inout(&self, receiver: &mut V) -> Result<(), EvalError> {
        let f = self
            .inout
            .as_ref()
            .ok_or(EvalError::MissingImplementation(Convention::Inout))?;
        f(receiver);
        Ok(())
    }

    fn invoke_sink(&self, receiver: V) -> Result<V, EvalError> {
        let f = self
            .sink
            .as_ref()
            .ok_or(EvalError::MissingImplementation(Convention::Sink))?;
        Ok(f(receiver))
    }

    fn run(&self, steps: &[Step], machine: &mut Machine<V>) -> Result<(), EvalError> {
        for step in steps {
            let missing = EvalError::MissingValue(*step);
            match step {
                Step::CopyReceiver => {
                    machine.local = Some(machine.receiver.clone().ok_or(missing)?);
                }
                Step::MoveReceiverIn => {
                    machine.local = Some(machine.receiver.take().ok_or(missing)?);
                }
                Step::Invoke(convention) => {
                    let local = machine.local.take().ok_or(missing)?;
                    machine.local = Some(match convention {
                        Convention::Let => self.invoke_let(&local)?,
                        Convention::Inout => {
                            let mut local = local;
                            self.invoke_inout(&mut local)?;
                            local
                        }
                        Convention::Sink => self.invoke_sink(local)?,
                        Convention::Set => {
                            return Err(EvalError::MissingImplementation(Convention::Set));
                        }
                    });
                }
                Step::AssignBackToReceiver => {
                    machine.receiver = Some(machine.local.take().ok_or(missing)?);
                }
                Step::ReturnLocal => {
                    machine.result = Some(machine.local.take().ok_or(missing)?);
                }
            }
        }
        Ok(())
    }

    /// Applies `variant` as a `let` access and returns the produced value.
    ///
    /// # Errors
    ///
    /// Fails if `variant` is not a `let` variant or relies on a missing
    /// implementation.
    pub fn apply_let(&self, variant: VariantImpl, receiver: &V) -> Result<V, EvalError> {
        Self::check(variant, Convention::Let)?;
        match variant {
            VariantImpl::Declared(_) => self.invoke_let(receiver),
            VariantImpl::Synthesized(synthesis) => {
                let mut machine = Machine {
                    receiver: Some(receiver.clone()),
                    local: None,
                    result: None,
                };
                self.run(synthesis.steps(), &mut machine)?;
                machine
                    .result
                    .ok_or(EvalError::MissingValue(Step::ReturnLocal))
            }
        }
    }

    /// Applies `variant` as an `inout` access on `receiver`.
    ///
    /// # Errors
    ///
    /// Fails if `variant` is not an `inout` variant or relies on a missing
    /// implementation.
    pub fn apply_inout(&self, variant: VariantImpl, receiver: &mut V) -> Result<(), EvalError> {
        Self::check(variant, Convention::Inout)?;
        match variant {
            VariantImpl::Declared(_) => self.invoke_inout(receiver),
            VariantImpl::Synthesized(synthesis) => {
                let mut machine = Machine {
                    receiver: Some(receiver.clone()),
                    local: None,
                    result: None,
                };
                self.run(synthesis.steps(), &mut machine)?;
                *receiver = machine
                    .receiver
                    .ok_or(EvalError::MissingValue(Step::AssignBackToReceiver))?;
                Ok(())
            }
        }
    }

    /// Applies `variant` as a `sink` access, consuming `receiver`.
    ///
    /// # Errors
    ///
    /// Fails if `variant` is not a `sink` variant or relies on a missing
    /// implementation.
    pub fn apply_sink(&self, variant: VariantImpl, receiver: V) -> Result<V, EvalError> {
        Self::check(variant, Convention::Sink)?;
        match variant {
            VariantImpl::Declared(_) => self.invoke_sink(receiver),
            VariantImpl::Synthesized(synthesis) => {
                let mut machine = Machine {
                    receiver: Some(receiver),
                    local: None,
                    result: None,
                };
                self.run(synthesis.steps(), &mut machine)?;
                machine
                    .result
                    .ok_or(EvalError::MissingValue(Step::ReturnLocal))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthesis::Synthesis;

    fn offset_by(delta: i64) -> VariantFns<'static, Vec<i64>> {
        VariantFns::new().with_inout(move |values: &mut Vec<i64>| {
            for value in values.iter_mut() {
                *value += delta;
            }
        })
    }

    #[test]
    fn test_sink_from_inout_matches_copy_in_call_return() {
        let fns = offset_by(3);
        let v = vec![1, 2];

        let synthesized = fns
            .apply_sink(VariantImpl::Synthesized(Synthesis::SinkFromInout), v.clone())
            .unwrap();

        let mut expected = v;
        fns.apply_inout(VariantImpl::Declared(Convention::Inout), &mut expected)
            .unwrap();
        assert_eq!(synthesized, expected);
        assert_eq!(synthesized, vec![4, 5]);
    }

    #[test]
    fn test_let_from_inout_leaves_receiver() {
        let fns = offset_by(1);
        let v = vec![10];
        let result = fns
            .apply_let(VariantImpl::Synthesized(Synthesis::LetFromInout), &v)
            .unwrap();
        assert_eq!(result, vec![11]);
        assert_eq!(v, vec![10]);
    }

    #[test]
    fn test_inout_from_sink_writes_back() {
        let fns = VariantFns::new().with_sink(|mut values: Vec<i64>| {
            values.push(0);
            values
        });
        let mut v = vec![7];
        fns.apply_inout(VariantImpl::Synthesized(Synthesis::InoutFromSink), &mut v)
            .unwrap();
        assert_eq!(v, vec![7, 0]);
    }

    #[test]
    fn test_missing_implementation() {
        let fns: VariantFns<'_, Vec<i64>> = VariantFns::new();
        assert_eq!(
            fns.apply_sink(VariantImpl::Synthesized(Synthesis::SinkFromLet), vec![]),
            Err(EvalError::MissingImplementation(Convention::Let))
        );
        assert_eq!(
            fns.apply_let(VariantImpl::Declared(Convention::Sink), &vec![]),
            Err(EvalError::ConventionMismatch {
                provided: Convention::Sink,
                applied: Convention::Let,
            })
        );
    }
}
