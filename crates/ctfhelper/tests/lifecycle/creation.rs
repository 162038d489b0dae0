use ctfhelper::{
    domain::{Error, ServerConfig, FEED_FOOTER, ROLE_REACTION},
    infra::{
        chat::{ChannelAccess, ChatError, OverwriteTarget, PermissionOverwrite},
        chat_mock::{ChatCall, ChatOp},
        ctftime::Error as IndexError,
        ctftime_mock::PNG_MAGIC,
    },
};
use time::macros::datetime;

use crate::helpers::{
    configured_bot, example_event, manager, member, unconfigured_bot, ACTIVE_CATEGORY,
    COMMAND_CHANNEL, EXAMPLE_ID, EXAMPLE_NAME, FEED_CHANNEL, GUILD, MANAGER_ROLE, TEAM_ROLE,
};

#[tokio::test]
async fn test_create_ctf_builds_every_artifact() {
    let bot = configured_bot().await;

    let ctf = bot.engine.create_ctf(&manager(), EXAMPLE_ID).await.unwrap();

    assert_eq!(ctf.name, EXAMPLE_NAME);
    assert_eq!(ctf.ctftime_id, EXAMPLE_ID);
    assert_eq!(ctf.guild_id, GUILD);

    let calls = bot.chat.calls();
    let ops: Vec<&str> = calls
        .iter()
        .map(|call| match call {
            ChatCall::CreateRole { .. } => "role",
            ChatCall::CreateChannel { .. } => "channel",
            ChatCall::SendMessage { .. } => "message",
            ChatCall::PinMessage { .. } => "pin",
            ChatCall::AddReaction { .. } => "reaction",
            ChatCall::CreateScheduledEvent { .. } => "event",
            _ => "other",
        })
        .collect();
    assert_eq!(
        ops,
        vec!["role", "channel", "message", "message", "pin", "message", "reaction", "event", "message"]
    );

    let ChatCall::CreateRole { role, role_id, .. } = &calls[0] else {
        panic!("expected role creation first");
    };
    assert_eq!(role.name, EXAMPLE_NAME);
    assert!(role.hoist && role.mentionable);
    assert_eq!(ctf.role_id, Some(*role_id));

    let ChatCall::CreateChannel {
        channel,
        channel_id,
        ..
    } = &calls[1]
    else {
        panic!("expected channel creation second");
    };
    assert_eq!(channel.name, EXAMPLE_NAME);
    assert_eq!(channel.category_id, ACTIVE_CATEGORY);
    assert_eq!(channel.topic.as_deref(), Some("https://examplectf.example"));
    assert_eq!(
        channel.overwrites,
        vec![
            PermissionOverwrite {
                target: OverwriteTarget::Everyone,
                access: ChannelAccess::Hidden,
            },
            PermissionOverwrite {
                target: OverwriteTarget::Role(*role_id),
                access: ChannelAccess::ReadWrite,
            },
            PermissionOverwrite {
                target: OverwriteTarget::Role(MANAGER_ROLE),
                access: ChannelAccess::Hidden,
            },
        ]
    );
    assert_eq!(ctf.text_channel_id, Some(*channel_id));

    let welcome = bot.chat.messages_in(*channel_id);
    assert_eq!(
        welcome[0].content.as_deref(),
        Some(format!("<@&{}> Welcome to the CTF **{}**! 🎉", role_id, EXAMPLE_NAME).as_str())
    );
    assert_eq!(
        welcome[1].content.as_deref(),
        Some("Link to ctf: https://examplectf.example")
    );

    let feed = bot.chat.messages_in(FEED_CHANNEL);
    assert_eq!(feed.len(), 1);
    let embed = &feed[0].embeds[0];
    assert_eq!(embed.title, "ExampleCTF");
    assert_eq!(embed.footer.as_deref(), Some(FEED_FOOTER));
    assert!(embed
        .description
        .as_deref()
        .unwrap()
        .contains("**Start Time:** <t:1748736000:f>"));
    assert!(calls.iter().any(|call| matches!(
        call,
        ChatCall::AddReaction { channel_id: FEED_CHANNEL, emoji, message_id }
            if *emoji == ROLE_REACTION && Some(*message_id) == ctf.message_id
    )));

    let event = calls
        .iter()
        .find_map(|call| match call {
            ChatCall::CreateScheduledEvent {
                event, event_id, ..
            } => Some((event.clone(), *event_id)),
            _ => None,
        })
        .unwrap();
    assert_eq!(ctf.event_id, Some(event.1));
    assert_eq!(event.0.start, datetime!(2025-06-01 0:00 UTC));
    assert_eq!(event.0.end, datetime!(2025-06-03 0:00 UTC));
    assert_eq!(event.0.location, "https://examplectf.example");
    assert!(event.0.image.is_none());

    let announcement = bot.chat.messages_in(COMMAND_CHANNEL);
    assert_eq!(
        announcement[0].content.as_deref(),
        Some(format!("<@&{}> New CTF published in <#{}> 🎉", TEAM_ROLE, FEED_CHANNEL).as_str())
    );
}

#[tokio::test]
async fn test_duplicate_create_has_no_side_effects() {
    let bot = configured_bot().await;
    bot.with_example_ctf().await;

    let err = bot
        .engine
        .create_ctf(&manager(), EXAMPLE_ID)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::DuplicateCtf(_)));
    assert_eq!(
        err.user_message(),
        "The CTF is already present in the discord server. ❌"
    );
    assert!(bot.chat.attempts().is_empty());
    assert_eq!(bot.engine.ctfs().list(GUILD).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_concurrent_creates_build_one_ctf() {
    let bot = configured_bot().await;
    let (first_caller, second_caller) = (manager(), manager());

    let (first, second) = tokio::join!(
        bot.engine.create_ctf(&first_caller, EXAMPLE_ID),
        bot.engine.create_ctf(&second_caller, EXAMPLE_ID)
    );

    let (created, rejected) = match (first, second) {
        (Ok(ctf), Err(e)) | (Err(e), Ok(ctf)) => (ctf, e),
        (first, second) => panic!("expected one creation, got {:?} and {:?}", first, second),
    };
    assert_eq!(created.name, EXAMPLE_NAME);
    assert!(matches!(rejected, Error::DuplicateCtf(_)));
    assert_eq!(bot.chat.attempt_count(ChatOp::CreateRole), 1);
    assert_eq!(bot.chat.attempt_count(ChatOp::CreateChannel), 1);
    assert_eq!(bot.engine.ctfs().list(GUILD).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_create_requires_configuration() {
    let bot = unconfigured_bot().await;

    let err = bot
        .engine
        .create_ctf(&manager(), EXAMPLE_ID)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotConfigured(GUILD)));

    bot.engine
        .servers()
        .upsert(ServerConfig {
            active_category_id: Some(ACTIVE_CATEGORY),
            manager_role_id: Some(MANAGER_ROLE),
            ..ServerConfig::new(GUILD)
        })
        .await
        .unwrap();
    let err = bot
        .engine
        .create_ctf(&manager(), EXAMPLE_ID)
        .await
        .unwrap_err();

    // no feed channel to publish in
    assert!(matches!(err, Error::NotConfigured(GUILD)));
    assert!(bot.chat.attempts().is_empty());
}

#[tokio::test]
async fn test_create_requires_manager_role() {
    let bot = configured_bot().await;

    let err = bot
        .engine
        .create_ctf(&member(), EXAMPLE_ID)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::MissingPermission(_)));
    assert!(bot.chat.attempts().is_empty());
    assert_eq!(bot.index.get_event_calls(), 0);
}

#[tokio::test]
async fn test_unknown_event_is_reported() {
    let bot = configured_bot().await;

    let err = bot.engine.create_ctf(&manager(), 1).await.unwrap_err();

    assert!(matches!(err, Error::EventIndex(IndexError::NotFound(_))));
    assert_eq!(err.user_message(), "The CTF was not found on CTFtime. ❌");
    assert!(bot.chat.attempts().is_empty());
}

#[tokio::test]
async fn test_unparseable_event_times_abort_creation() {
    let bot = configured_bot().await;
    let mut broken = example_event();
    broken.id = 777;
    broken.start = String::new();
    bot.index.add_event(broken);

    let err = bot.engine.create_ctf(&manager(), 777).await.unwrap_err();

    assert!(matches!(err, Error::EventIndex(IndexError::Decode(_))));
    assert!(bot.chat.attempts().is_empty());
}

#[tokio::test]
async fn test_rejected_logo_retries_without_image() {
    let bot = configured_bot().await;
    let mut event = example_event();
    event.logo = String::from("https://ctftime.org/media/logo.png");
    bot.index.add_event(event);
    bot.index
        .set_logo("https://ctftime.org/media/logo.png", PNG_MAGIC.to_vec());
    bot.chat
        .fail_times(ChatOp::CreateScheduledEvent, ChatError::UnsupportedImage, 1);

    let ctf = bot.engine.create_ctf(&manager(), EXAMPLE_ID).await.unwrap();

    assert_eq!(bot.chat.attempt_count(ChatOp::CreateScheduledEvent), 2);
    let events: Vec<_> = bot
        .chat
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            ChatCall::CreateScheduledEvent { event, event_id, .. } => Some((event, event_id)),
            _ => None,
        })
        .collect();
    assert_eq!(events.len(), 1);
    assert!(events[0].0.image.is_none());
    assert_eq!(ctf.event_id, Some(events[0].1));
}

#[tokio::test]
async fn test_accepted_logo_is_attached() {
    let bot = configured_bot().await;
    let mut event = example_event();
    event.logo = String::from("https://ctftime.org/media/logo.png");
    bot.index.add_event(event);
    bot.index
        .set_logo("https://ctftime.org/media/logo.png", PNG_MAGIC.to_vec());

    bot.engine.create_ctf(&manager(), EXAMPLE_ID).await.unwrap();

    let image = bot.chat.calls().into_iter().find_map(|call| match call {
        ChatCall::CreateScheduledEvent { event, .. } => event.image,
        _ => None,
    });
    let image = image.expect("logo attached");
    assert_eq!(image.file_name, "logo.png");
    assert_eq!(image.data, PNG_MAGIC.to_vec());
}

#[tokio::test]
async fn test_failed_pin_and_announcement_do_not_abort() {
    let bot = configured_bot().await;
    bot.chat
        .fail(ChatOp::PinMessage, ChatError::Http(String::from("boom")));

    let ctf = bot.engine.create_ctf(&manager(), EXAMPLE_ID).await.unwrap();

    assert!(bot.engine.ctfs().get(ctf.id).await.unwrap().is_some());
    assert_eq!(bot.chat.attempt_count(ChatOp::PinMessage), 1);
}

#[tokio::test]
async fn test_channel_failure_leaves_no_record() {
    let bot = configured_bot().await;
    bot.chat
        .fail(ChatOp::CreateChannel, ChatError::Http(String::from("boom")));

    let err = bot
        .engine
        .create_ctf(&manager(), EXAMPLE_ID)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Chat(_)));
    assert!(bot.engine.ctfs().list(GUILD).await.unwrap().is_empty());
    assert_eq!(bot.chat.attempt_count(ChatOp::SendMessage), 0);
}

#[tokio::test]
async fn test_init_requires_admin() {
    let bot = unconfigured_bot().await;
    let mut admin = member();

    let err = bot
        .engine
        .init_server(&admin, ServerConfig::new(GUILD))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::MissingPermission(_)));

    admin.is_admin = true;
    let config = bot
        .engine
        .init_server(
            &admin,
            ServerConfig {
                active_category_id: Some(ACTIVE_CATEGORY),
                ..ServerConfig::new(999)
            },
        )
        .await
        .unwrap();

    // the guild always comes from where the command ran
    assert_eq!(config.guild_id, GUILD);
    assert_eq!(
        bot.engine.servers().get(GUILD).await.unwrap(),
        Some(config)
    );
}

#[tokio::test]
async fn test_next_ctfs_clamps_limit() {
    let bot = configured_bot().await;
    for id in 0..12 {
        bot.index.add_event(crate::helpers::event(
            100 + id,
            &format!("Event{}", id),
            &format!("2025-07-{:02}T00:00:00Z", id + 1),
            &format!("2025-07-{:02}T12:00:00Z", id + 1),
        ));
    }

    let embed = bot.engine.next_ctfs(Some(50)).await.unwrap();
    assert_eq!(embed.title, "📋 Next CTFs");
    assert_eq!(embed.footer.as_deref(), Some("Total: 10 available CTFs"));

    let embed = bot.engine.next_ctfs(None).await.unwrap();
    assert_eq!(embed.footer.as_deref(), Some("Total: 5 available CTFs"));
    assert!(embed.description.unwrap().starts_with("### 1 • ExampleCTF"));
}
