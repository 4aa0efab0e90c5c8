// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::cell::RefCell;
use std::fmt::Display;
use std::rc::Rc;

use itertools::join;
use regex::Regex;

/// Accumulates a sequence of messages (e.g. validation failures).
#[derive(Default, Clone)]
pub struct MessageAccumulator {
    /// Accumulated messages. Shared so that closures handed to table iteration can
    /// record into the same collection.
    msgs: Rc<RefCell<Vec<String>>>,
}

impl MessageAccumulator {
    pub fn is_empty(&self) -> bool {
        self.msgs.borrow().is_empty()
    }

    pub fn messages(&self) -> Vec<String> {
        self.msgs.borrow().to_owned()
    }

    /// Adds a message to the accumulator
    pub fn add(&self, msg: &str) {
        self.msgs.borrow_mut().push(msg.to_owned());
    }

    /// Adds a message if predicate is false
    pub fn require(&self, predicate: bool, msg: &str) {
        if !predicate {
            self.add(msg);
        }
    }

    /// Adds a message if result is `Err`. Underlying error must be `Display`.
    pub fn require_no_error<V, E: Display>(&self, result: Result<V, E>, msg: &str) {
        if let Err(e) = result {
            self.add(&format!("{msg}: {e}"));
        }
    }

    /// Panics if the accumulator holds any message.
    pub fn assert_empty(&self) {
        assert!(self.is_empty(), "{}", join(self.msgs.borrow().iter(), "\n"))
    }

    /// Asserts the accumulator holds exactly one message matching each pattern, in order.
    pub fn assert_expected(&self, expected_patterns: &[Regex]) {
        let messages = self.messages();
        assert!(
            messages.len() == expected_patterns.len(),
            "Incorrect number of accumulator messages. Actual: {}.\nExpected: {}",
            join(messages.iter(), "\n"),
            join(expected_patterns.iter().map(|regex| regex.as_str()), "\n")
        );

        messages.iter().zip(expected_patterns).for_each(|(message, pattern)| {
            assert!(
                pattern.is_match(message),
                "message does not match. Actual: {}, expected: {}",
                message,
                pattern.as_str()
            );
        });
    }
}
