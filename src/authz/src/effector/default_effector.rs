//! Built-in effect combinator

use super::{Effect, EffectKind, Effector, EffectorStream};

/// Stateless factory for [`DefaultEffectStream`]
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultEffector;

impl Effector for DefaultEffector {
    fn new_stream(&self, kind: EffectKind) -> Box<dyn EffectorStream> {
        Box::new(DefaultEffectStream::new(kind))
    }
}

#[derive(Debug, Clone)]
pub struct DefaultEffectStream {
    kind: EffectKind,
    verdict: bool,
    done: bool,
    pushed: usize,
    explain: Option<usize>,
}

impl DefaultEffectStream {
    pub fn new(kind: EffectKind) -> Self {
        Self {
            kind,
            verdict: kind.default_verdict(),
            done: false,
            pushed: 0,
            explain: None,
        }
    }

    fn decide(&mut self, verdict: bool, idx: usize) {
        self.verdict = verdict;
        self.done = true;
        self.explain = Some(idx);
    }
}

impl EffectorStream for DefaultEffectStream {
    fn push_effect(&mut self, effect: Effect) -> bool {
        if self.done {
            return true;
        }
        let idx = self.pushed;
        self.pushed += 1;

        match (self.kind, effect) {
            (EffectKind::AllowOverride, Effect::Allow) => self.decide(true, idx),
            (EffectKind::DenyOverride, Effect::Deny) | (EffectKind::AllowAndDeny, Effect::Deny) => {
                self.decide(false, idx)
            }
            (EffectKind::AllowAndDeny, Effect::Allow) => {
                // A later deny still wins
                self.verdict = true;
                self.explain.get_or_insert(idx);
            }
            (EffectKind::Priority | EffectKind::SubjectPriority, Effect::Allow) => {
                self.decide(true, idx)
            }
            (EffectKind::Priority | EffectKind::SubjectPriority, Effect::Deny) => {
                self.decide(false, idx)
            }
            _ => {}
        }

        self.done
    }

    fn next(&self) -> bool {
        self.verdict
    }

    fn explain(&self) -> Option<usize> {
        self.explain
    }
}
