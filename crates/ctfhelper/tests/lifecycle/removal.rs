use ctfhelper::{
    domain::Error,
    infra::{
        chat::ChatError,
        chat_mock::{ChatCall, ChatOp},
    },
};

use crate::helpers::{configured_bot, manager, member, FEED_CHANNEL, GUILD};

#[tokio::test]
async fn test_remove_tears_everything_down() {
    let bot = configured_bot().await;
    let ctf = bot.with_example_ctf().await;
    bot.engine
        .submit_flag(
            &crate::helpers::in_channel(member(), ctf.text_channel_id.unwrap()),
            "flag{x}",
            None,
            None,
        )
        .await
        .unwrap();

    let listed = bot.engine.list_ctfs(&manager()).await.unwrap();
    assert_eq!(listed, vec![ctf.clone()]);

    let report = bot
        .engine
        .remove_ctf(&manager(), &ctf.id.to_string())
        .await
        .unwrap();

    assert!(report.role_deleted && report.event_deleted && report.feed_message_deleted);
    let calls = bot.chat.calls();
    assert!(calls.contains(&ChatCall::DeleteChannel {
        channel_id: ctf.text_channel_id.unwrap(),
    }));
    assert!(calls.contains(&ChatCall::DeleteRole {
        guild_id: GUILD,
        role_id: ctf.role_id.unwrap(),
    }));
    assert!(calls.contains(&ChatCall::DeleteScheduledEvent {
        guild_id: GUILD,
        event_id: ctf.event_id.unwrap(),
    }));
    assert!(calls.contains(&ChatCall::DeleteMessage {
        channel_id: FEED_CHANNEL,
        message_id: ctf.message_id.unwrap(),
    }));
    assert!(bot.engine.ctfs().get(ctf.id).await.unwrap().is_none());
    assert!(bot.engine.ctfs().get_report(ctf.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_channel_failure_keeps_the_record() {
    let bot = configured_bot().await;
    let ctf = bot.with_example_ctf().await;
    bot.chat
        .fail_times(ChatOp::DeleteChannel, ChatError::Http(String::from("boom")), 1);

    let err = bot
        .engine
        .remove_ctf(&manager(), &ctf.id.to_string())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Chat(_)));
    assert!(bot.engine.ctfs().get(ctf.id).await.unwrap().is_some());
    assert_eq!(bot.chat.attempt_count(ChatOp::DeleteRole), 0);

    // a retry goes through
    bot.engine
        .remove_ctf(&manager(), &ctf.id.to_string())
        .await
        .unwrap();
    assert!(bot.engine.ctfs().get(ctf.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_missing_channel_counts_as_deleted() {
    let bot = configured_bot().await;
    let ctf = bot.with_example_ctf().await;
    bot.chat.fail(
        ChatOp::DeleteChannel,
        ChatError::NotFound(String::from("channel")),
    );

    bot.engine
        .remove_ctf(&manager(), &ctf.id.to_string())
        .await
        .unwrap();

    assert!(bot.engine.ctfs().get(ctf.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_secondary_failures_do_not_block_removal() {
    let bot = configured_bot().await;
    let ctf = bot.with_example_ctf().await;
    bot.chat
        .fail(ChatOp::DeleteRole, ChatError::Http(String::from("boom")));
    bot.chat.fail(
        ChatOp::DeleteScheduledEvent,
        ChatError::Http(String::from("boom")),
    );

    let report = bot
        .engine
        .remove_ctf(&manager(), &ctf.id.to_string())
        .await
        .unwrap();

    assert!(!report.role_deleted);
    assert!(!report.event_deleted);
    assert!(report.feed_message_deleted);
    assert!(bot.engine.ctfs().get(ctf.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_remove_rejects_bad_selection() {
    let bot = configured_bot().await;
    let ctf = bot.with_example_ctf().await;

    let err = bot
        .engine
        .remove_ctf(&manager(), "not-a-ctf")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));

    let err = bot.engine.remove_ctf(&manager(), "999").await.unwrap_err();
    assert!(matches!(err, Error::CtfNotFound(_)));

    let err = bot
        .engine
        .remove_ctf(&member(), &ctf.id.to_string())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::MissingPermission(_)));
    assert!(bot.chat.attempts().is_empty());
}
