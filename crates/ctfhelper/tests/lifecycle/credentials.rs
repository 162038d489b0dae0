use ctfhelper::domain::{CredsLookup, Error, CREDS_MODAL_PREFIX};
use secrecy::SecretString;

use crate::helpers::{configured_bot, in_channel, manager, member};

#[tokio::test]
async fn test_credentials_flow() {
    let bot = configured_bot().await;
    let ctf = bot.with_example_ctf().await;
    let caller = in_channel(member(), ctf.text_channel_id.unwrap());

    let CredsLookup::Missing { modal_id } = bot.engine.creds(&caller).await.unwrap() else {
        panic!("no credentials stored yet");
    };
    assert_eq!(modal_id, format!("{}{}", CREDS_MODAL_PREFIX, ctf.id));

    let announcement = bot
        .engine
        .submit_creds(
            &caller,
            &modal_id,
            String::from("team"),
            SecretString::from(String::from("hunter2")),
            " YES ",
        )
        .await
        .unwrap();
    assert_eq!(
        announcement,
        format!("<@&{}>, Credentials submitted ✅.", ctf.role_id.unwrap())
    );

    let CredsLookup::Found(embed) = bot.engine.creds(&caller).await.unwrap() else {
        panic!("credentials were stored");
    };
    assert_eq!(embed.title, format!("Credentials for {}", ctf.name));
    let description = embed.description.unwrap();
    assert!(description.contains("**Username:** `team`"));
    assert!(description.contains("**Password:** `hunter2`"));
    assert!(description.contains("**Need personal:** Yes"));
}

#[tokio::test]
async fn test_form_from_another_ctf_is_rejected() {
    let bot = configured_bot().await;
    let ctf = bot.with_example_ctf().await;
    let caller = in_channel(member(), ctf.text_channel_id.unwrap());

    for modal_id in [
        format!("{}{}", CREDS_MODAL_PREFIX, ctf.id + 1),
        String::from("something_else"),
    ] {
        let err = bot
            .engine
            .submit_creds(
                &caller,
                &modal_id,
                String::from("team"),
                SecretString::from(String::from("pw")),
                "no",
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }
    assert!(bot.engine.ctfs().get_creds(ctf.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_delete_credentials() {
    let bot = configured_bot().await;
    let ctf = bot.with_example_ctf().await;
    let channel = ctf.text_channel_id.unwrap();
    bot.engine
        .submit_creds(
            &in_channel(member(), channel),
            &format!("{}{}", CREDS_MODAL_PREFIX, ctf.id),
            String::from("team"),
            SecretString::from(String::from("pw")),
            "no",
        )
        .await
        .unwrap();

    let err = bot
        .engine
        .delete_creds(&in_channel(member(), channel))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::MissingPermission(_)));

    let manager = in_channel(manager(), channel);
    bot.engine.delete_creds(&manager).await.unwrap();
    let err = bot.engine.delete_creds(&manager).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}
