//! Scripted conversations for demo mode and previews

use chrono::{DateTime, Duration, Utc};

use crate::conversation::{ConversationMessage, Role};

/// One pre-authored exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DemoTurn {
    pub user: &'static str,
    pub assistant: &'static str,
}

const BUILTIN_TURNS: &[DemoTurn] = &[
    DemoTurn {
        user: "Hi I wanna learn english",
        assistant: "Absolutely, let's do it. Quick correction: say 'Hi, I want to learn English.'\n\nWarm-up question: What's your name and where are you from?",
    },
    DemoTurn {
        user: "my name is malone Im in the unites states",
        assistant: "Nice to meet you, Malone! Quick correction: 'My name is Malone. I'm in the United States.'\n\nNow tell me: What do you do for work?",
    },
    DemoTurn {
        user: "Im a developer practiing for client meatings",
        assistant: "Great goal. A few quick fixes:\n- 'I'm' (with the apostrophe)\n- 'practicing' (spelling)\n- 'meetings' (spelling)\n\nBest version: 'I'm a developer practicing for client meetings.'\n\nSay it again slowly, then add: 'I want to sound more confident.'",
    },
    DemoTurn {
        user: "I'm a developer practicing for client meetings. I want to sound more confident.",
        assistant: "Perfect. Here's a client-meeting phrase to practice:\n'Just to clarify, the next step is...'\n\nTip: stress 'clarify' (CLA-ri-fy).\n\nYour turn: Finish the sentence with a realistic next step.",
    },
];

/// Fixed sequence of turns, cycled by cursor
#[derive(Debug, Clone, Copy)]
pub struct DemoScript {
    turns: &'static [DemoTurn],
}

impl Default for DemoScript {
    fn default() -> Self {
        Self::new(BUILTIN_TURNS)
    }
}

impl DemoScript {
    #[must_use]
    pub const fn new(turns: &'static [DemoTurn]) -> Self {
        Self { turns }
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.turns.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Turn for `cursor`, wrapping around the end of the script
    #[must_use]
    pub fn turn(&self, cursor: usize) -> Option<&'static DemoTurn> {
        cursor
            .checked_rem(self.turns.len())
            .and_then(|index| self.turns.get(index))
    }
}

/// Illustrative finished conversation, stamped relative to `now`
#[must_use]
pub fn preview_transcript(now: DateTime<Utc>) -> Vec<ConversationMessage> {
    let ago = |secs: i64| now - Duration::seconds(secs);

    vec![
        ConversationMessage::at(Role::User, "Hi I wanna learn english", ago(60)),
        ConversationMessage::at(
            Role::Assistant,
            "Great! I'm here to help you practice. Quick correction: say 'Hi, I want to learn English.'\n\nNow try this: Tell me one thing you did yesterday.",
            ago(55),
        ),
        ConversationMessage::at(
            Role::User,
            "Yesterday I go to the store and buyed some apples",
            ago(45),
        ),
        ConversationMessage::at(
            Role::Assistant,
            "Nice effort! Two small fixes:\n- 'Yesterday I went to the store...' (past of go = went)\n- '...and bought some apples.' (past of buy = bought)\n\nCorrected sentence: 'Yesterday, I went to the store and bought some apples.'\n\nYour turn: Say it again, slowly.",
            ago(40),
        ),
        ConversationMessage::at(
            Role::User,
            "Yesterday, I went to the store and bought some apples. Also I don't know how to say the 'th' sound",
            ago(25),
        ),
        ConversationMessage::at(
            Role::Assistant,
            "Great sentence! One tiny edit: 'Also, I don't know how to pronounce the \"th\" sound.'\n\nPronunciation tip:\n- Put your tongue lightly between your teeth\n- Blow air gently: 'thhh'\n\nTry: 'think' and 'this'. Which one is harder for you?",
            ago(20),
        ),
    ]
}
