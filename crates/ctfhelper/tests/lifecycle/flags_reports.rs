use ctfhelper::{
    domain::{Error, LifecycleEngine, FLAG_REACTION},
    infra::{
        chat_mock::{ChatCall, ChatOp},
        ctftime::{Error as IndexError, TeamResult},
    },
};
use time::Duration;

use crate::helpers::{
    bot_with_index, configured_bot, in_channel, manager, member, MockIndex, EXAMPLE_ID,
    MANAGER, MEMBER, TEAM_ID, WEDNESDAY,
};

#[tokio::test]
async fn test_flag_is_announced_and_counted() {
    let bot = configured_bot().await;
    let ctf = bot.with_example_ctf().await;
    let channel = ctf.text_channel_id.unwrap();
    let role = ctf.role_id.unwrap();

    let receipt = bot
        .engine
        .submit_flag(
            &in_channel(member(), channel),
            "flag{first}",
            Some(MANAGER),
            Some("baby-rev"),
        )
        .await
        .unwrap();
    assert_eq!(receipt.solves, 1);
    assert_eq!(receipt.channel_id, channel);

    let messages = bot.chat.messages_in(channel);
    assert_eq!(
        messages[0].content.as_deref(),
        Some(
            format!(
                "<@&{}> NEW FLAG FOUND BY <@{}> and <@{}> for challenge: baby-rev 🎉\n> `flag{{first}}`",
                role, MEMBER, MANAGER
            )
            .as_str()
        )
    );
    assert!(bot.chat.calls().contains(&ChatCall::AddReaction {
        channel_id: channel,
        message_id: receipt.message_id,
        emoji: FLAG_REACTION,
    }));

    let second = bot
        .engine
        .submit_flag(&in_channel(member(), channel), "flag{second}", None, None)
        .await
        .unwrap();
    assert_eq!(second.solves, 2);
}

#[tokio::test]
async fn test_flag_from_thread_locks_it() {
    let bot = configured_bot().await;
    let ctf = bot.with_example_ctf().await;
    let channel = ctf.text_channel_id.unwrap();
    bot.chat.add_thread(9_000, channel);

    let receipt = bot
        .engine
        .submit_flag(&in_channel(member(), 9_000), "flag{thread}", None, None)
        .await
        .unwrap();

    assert_eq!(receipt.channel_id, channel);
    assert_eq!(bot.chat.messages_in(channel).len(), 1);
    assert!(bot
        .chat
        .calls()
        .contains(&ChatCall::LockThread { thread_id: 9_000 }));
}

#[tokio::test]
async fn test_flag_outside_ctf_channel() {
    let bot = configured_bot().await;
    bot.with_example_ctf().await;

    let err = bot
        .engine
        .submit_flag(&member(), "flag{lost}", None, None)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::CtfNotFound(_)));
    assert_eq!(
        err.user_message(),
        "This command can only be used inside a CTF channel. ❌"
    );
    assert_eq!(bot.chat.attempt_count(ChatOp::SendMessage), 0);
}

#[tokio::test]
async fn test_delete_flag_never_goes_negative() {
    let bot = configured_bot().await;
    let ctf = bot.with_example_ctf().await;
    let caller = in_channel(manager(), ctf.text_channel_id.unwrap());

    assert_eq!(bot.engine.delete_flag(&caller).await.unwrap(), None);

    bot.engine
        .submit_flag(&caller, "flag{one}", None, None)
        .await
        .unwrap();
    assert_eq!(bot.engine.delete_flag(&caller).await.unwrap(), Some(0));
    assert_eq!(bot.engine.delete_flag(&caller).await.unwrap(), Some(0));

    let err = bot
        .engine
        .delete_flag(&in_channel(member(), ctf.text_channel_id.unwrap()))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::MissingPermission(_)));
}

#[tokio::test]
async fn test_report_fetches_team_result() {
    let bot = configured_bot().await;
    let ctf = bot.with_example_ctf().await;
    let caller = in_channel(manager(), ctf.text_channel_id.unwrap());
    bot.engine
        .submit_flag(&caller, "flag{one}", None, None)
        .await
        .unwrap();
    bot.index.set_team_result(
        2025,
        EXAMPLE_ID,
        TEAM_ID,
        TeamResult {
            place: 4,
            score: 1337,
            solves: 0,
        },
    );

    let (_, report) = bot.engine.report(&caller).await.unwrap();

    assert_eq!(report.place, 4);
    assert_eq!(report.score, 1337);
    // local count wins over a roster that lags behind
    assert_eq!(report.solves, 1);
    assert_eq!(report.refreshed_at, Some(WEDNESDAY));
    assert_eq!(bot.index.team_result_calls(), 1);

    let embed = LifecycleEngine::report_embed(&ctf, &report);
    let values: Vec<&str> = embed.fields.iter().map(|f| f.value.as_str()).collect();
    assert_eq!(values, vec!["4", "1337", "1"]);
}

#[tokio::test]
async fn test_unranked_team_reports_unknown_place() {
    let bot = configured_bot().await;
    let ctf = bot.with_example_ctf().await;
    let caller = in_channel(manager(), ctf.text_channel_id.unwrap());

    let (_, report) = bot.engine.report(&caller).await.unwrap();
    assert_eq!((report.place, report.score), (-1, -1));

    // unknown values keep asking the index
    bot.engine.report(&caller).await.unwrap();
    assert_eq!(bot.index.team_result_calls(), 2);
}

#[tokio::test]
async fn test_stale_report_is_refetched() {
    let bot = configured_bot().await;
    let ctf = bot.with_example_ctf().await;
    let caller = in_channel(manager(), ctf.text_channel_id.unwrap());
    bot.index.set_team_result(
        2025,
        EXAMPLE_ID,
        TEAM_ID,
        TeamResult {
            place: 9,
            score: 300,
            solves: 2,
        },
    );

    bot.engine.report(&caller).await.unwrap();
    bot.set_now(WEDNESDAY + Duration::hours(23));
    bot.engine.report(&caller).await.unwrap();
    assert_eq!(bot.index.team_result_calls(), 1);

    bot.set_now(WEDNESDAY + Duration::hours(25));
    let (_, report) = bot.engine.report(&caller).await.unwrap();
    assert_eq!(bot.index.team_result_calls(), 2);
    assert_eq!(report.refreshed_at, Some(WEDNESDAY + Duration::hours(25)));
}

#[tokio::test]
async fn test_fresh_report_is_never_refetched() {
    let mut index = MockIndex::new();
    index
        .expect_team_result()
        .times(1)
        .returning(|year, event_id, team_id| {
            assert_eq!((year, event_id, team_id), (2025, EXAMPLE_ID, TEAM_ID));
            Ok(Some(TeamResult {
                place: 1,
                score: 9000,
                solves: 12,
            }))
        });
    let (engine, _chat, ctf) = bot_with_index(index).await;
    let caller = in_channel(manager(), ctf.text_channel_id.unwrap());

    let (_, first) = engine.report(&caller).await.unwrap();
    let (_, second) = engine.report(&caller).await.unwrap();

    assert_eq!(
        (first.place, first.score, first.solves),
        (second.place, second.score, second.solves)
    );
    assert_eq!(second.solves, 12);
}

#[tokio::test]
async fn test_report_surfaces_index_failure() {
    let bot = configured_bot().await;
    let ctf = bot.with_example_ctf().await;
    bot.index.fail_results(true);

    let err = bot
        .engine
        .report(&in_channel(manager(), ctf.text_channel_id.unwrap()))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::EventIndex(IndexError::Request(_))));
    assert_eq!(
        err.user_message(),
        "Failed to get the information of the CTF. ❌"
    );
    assert!(bot.engine.ctfs().get_report(ctf.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_challenge_thread() {
    let bot = configured_bot().await;
    let ctf = bot.with_example_ctf().await;
    let channel = ctf.text_channel_id.unwrap();

    let thread_id = bot
        .engine
        .chall(
            &in_channel(member(), channel),
            ctfhelper::domain::Challenge {
                name: String::from(" heap-hop "),
                category: Some(String::from("pwn")),
                description: None,
            },
        )
        .await
        .unwrap();

    let messages = bot.chat.messages_in(channel);
    assert_eq!(messages[0].embeds[0].title, "Challenge: heap-hop");
    assert_eq!(messages[0].embeds[0].fields.len(), 1);
    assert!(bot.chat.calls().iter().any(|call| matches!(
        call,
        ChatCall::CreateThread { name, thread_id: id, .. } if name == "heap-hop" && *id == thread_id
    )));
}
