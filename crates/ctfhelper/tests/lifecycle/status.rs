use ctfhelper::{
    domain::{CompletionOutcome, StatusOutcome},
    infra::{
        chat::{ChatError, RoleUpdate},
        chat_mock::{ChatCall, ChatOp},
    },
};
use ctfhelper_core::{EventStatus, ARCHIVED_ROLE_COLOR};

use crate::helpers::{configured_bot, TestBot, ARCHIVE_CATEGORY, GUILD};

async fn started_bot() -> (TestBot, ctfhelper::domain::Ctf) {
    let bot = configured_bot().await;
    let ctf = bot.with_example_ctf().await;
    (bot, ctf)
}

#[tokio::test]
async fn test_start_is_announced_once() {
    let (bot, ctf) = started_bot().await;
    let event_id = ctf.event_id.unwrap();
    let channel = ctf.text_channel_id.unwrap();

    let scheduled = bot
        .engine
        .handle_status_update(GUILD, event_id, "ExampleCTF", EventStatus::Scheduled)
        .await
        .unwrap();
    assert_eq!(scheduled, StatusOutcome::Ignored);

    let started = bot
        .engine
        .handle_status_update(GUILD, event_id, "ExampleCTF", EventStatus::Active)
        .await
        .unwrap();
    assert_eq!(started, StatusOutcome::Started { ctf_id: ctf.id });

    let repeated = bot
        .engine
        .handle_status_update(GUILD, event_id, "ExampleCTF", EventStatus::Active)
        .await
        .unwrap();
    assert_eq!(repeated, StatusOutcome::Ignored);

    let messages = bot.chat.messages_in(channel);
    assert_eq!(messages.len(), 1);
    assert_eq!(
        messages[0].content.as_deref(),
        Some(
            format!(
                "<@&{}> The CTF has started! Good luck to all participants! 🎉",
                ctf.role_id.unwrap()
            )
            .as_str()
        )
    );
}

#[tokio::test]
async fn test_restart_does_not_replay_transitions() {
    let (bot, ctf) = started_bot().await;
    let event_id = ctf.event_id.unwrap();
    let channel = ctf.text_channel_id.unwrap();

    let started = bot
        .engine
        .handle_status_update(GUILD, event_id, "ExampleCTF", EventStatus::Active)
        .await
        .unwrap();
    assert_eq!(started, StatusOutcome::Started { ctf_id: ctf.id });

    let restarted = bot.restarted();
    let edited = restarted
        .handle_status_update(GUILD, event_id, "ExampleCTF", EventStatus::Active)
        .await
        .unwrap();
    assert_eq!(edited, StatusOutcome::Ignored);
    assert_eq!(bot.chat.messages_in(channel).len(), 1);

    let completed = restarted
        .handle_status_update(GUILD, event_id, "ExampleCTF", EventStatus::Completed)
        .await
        .unwrap();
    assert!(matches!(completed, StatusOutcome::Completed { .. }));

    let again = bot
        .restarted()
        .handle_status_update(GUILD, event_id, "ExampleCTF", EventStatus::Completed)
        .await
        .unwrap();
    assert_eq!(again, StatusOutcome::Ignored);
    assert_eq!(bot.chat.messages_in(channel).len(), 2);
}

#[tokio::test]
async fn test_completion_archives_the_ctf() {
    let (bot, ctf) = started_bot().await;
    let channel = ctf.text_channel_id.unwrap();
    let role = ctf.role_id.unwrap();

    let outcome = bot
        .engine
        .handle_status_update(GUILD, ctf.event_id.unwrap(), "ExampleCTF", EventStatus::Completed)
        .await
        .unwrap();

    assert_eq!(
        outcome,
        StatusOutcome::Completed {
            ctf_id: ctf.id,
            outcome: CompletionOutcome {
                moved: true,
                role_neutralized: true,
                announced: true,
            },
        }
    );
    let calls = bot.chat.calls();
    assert!(calls.contains(&ChatCall::MoveChannel {
        channel_id: channel,
        category_id: ARCHIVE_CATEGORY,
    }));
    assert!(calls.contains(&ChatCall::UpdateRole {
        guild_id: GUILD,
        role_id: role,
        update: RoleUpdate {
            color: Some(ARCHIVED_ROLE_COLOR),
            hoist: Some(false),
            mentionable: Some(false),
        },
    }));
    assert!(bot.chat.messages_in(channel)[0]
        .content
        .as_deref()
        .unwrap()
        .contains("has ended! The channel has been moved to the archived category."));

    // a repeated completion does nothing
    bot.chat.reset();
    let repeated = bot
        .engine
        .handle_status_update(GUILD, ctf.event_id.unwrap(), "ExampleCTF", EventStatus::Completed)
        .await
        .unwrap();
    assert_eq!(repeated, StatusOutcome::Ignored);
    assert!(bot.chat.attempts().is_empty());
}

async fn complete_with_fault(op: ChatOp) -> CompletionOutcome {
    let (bot, ctf) = started_bot().await;
    bot.chat.fail(op, ChatError::Http(String::from("boom")));

    let outcome = bot
        .engine
        .handle_status_update(GUILD, ctf.event_id.unwrap(), "ExampleCTF", EventStatus::Completed)
        .await
        .unwrap();

    // every step is still attempted
    assert_eq!(bot.chat.attempt_count(ChatOp::MoveChannel), 1);
    assert_eq!(bot.chat.attempt_count(ChatOp::UpdateRole), 1);
    assert_eq!(bot.chat.attempt_count(ChatOp::SendMessage), 1);
    match outcome {
        StatusOutcome::Completed { outcome, .. } => outcome,
        other => panic!("expected completion, got {:?}", other),
    }
}

#[tokio::test]
async fn test_completion_steps_fail_independently() {
    assert_eq!(
        complete_with_fault(ChatOp::MoveChannel).await,
        CompletionOutcome {
            moved: false,
            role_neutralized: true,
            announced: true,
        }
    );
    assert_eq!(
        complete_with_fault(ChatOp::UpdateRole).await,
        CompletionOutcome {
            moved: true,
            role_neutralized: false,
            announced: true,
        }
    );
    assert_eq!(
        complete_with_fault(ChatOp::SendMessage).await,
        CompletionOutcome {
            moved: true,
            role_neutralized: true,
            announced: false,
        }
    );
}

#[tokio::test]
async fn test_unknown_event_falls_back_to_name() {
    let (bot, ctf) = started_bot().await;

    let outcome = bot
        .engine
        .handle_status_update(GUILD, 424_242, "ExampleCTF", EventStatus::Active)
        .await
        .unwrap();
    assert_eq!(outcome, StatusOutcome::Started { ctf_id: ctf.id });

    let outcome = bot
        .engine
        .handle_status_update(GUILD, 434_343, "SomethingElse", EventStatus::Active)
        .await
        .unwrap();
    assert_eq!(outcome, StatusOutcome::Unresolved);
}

#[tokio::test]
async fn test_blank_event_name_resolves_nothing() {
    let (bot, _ctf) = started_bot().await;

    let outcome = bot
        .engine
        .handle_status_update(GUILD, 454_545, "", EventStatus::Active)
        .await
        .unwrap();
    assert_eq!(outcome, StatusOutcome::Unresolved);
    assert!(bot.chat.calls().is_empty());
}
