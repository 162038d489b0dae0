use std::time::Instant;

use log::{debug, error, info, warn};
use secrecy::SecretString;
use serenity::all::{
    ActionRowComponent, CommandDataOptionValue, CommandInteraction, ComponentInteraction,
    ComponentInteractionDataKind, Context, CreateActionRow, CreateInputText,
    CreateInteractionResponse, CreateInteractionResponseMessage, CreateModal, CreateSelectMenu,
    CreateSelectMenuKind, CreateSelectMenuOption, EditInteractionResponse, InputTextStyle,
    Interaction, ModalInteraction,
};

use crate::{
    domain::{Caller, Challenge, CredsLookup, Ctf, Error, LifecycleEngine, ServerConfig},
    infra::{chat::Embed, discord::build_embed},
};

use super::commands::{
    CHALL, CREATE, CREDS, DELETE_CREDS, DELETE_FLAG, FLAG, INIT, NEXT_CTFS, PING, REMOVE, REPORT,
    VERSION, VOTE,
};

pub const REMOVE_SELECT_ID: &str = "remove_ctf_select";
/// Discord caps a select menu at this many options.
const MAX_SELECT_OPTIONS: usize = 25;

/// What a finished command shows the member.
enum Reply {
    Text(String),
    Embed(Embed),
    RemoveMenu(Vec<Ctf>),
}

fn caller_of(
    user_id: u64,
    guild_id: Option<u64>,
    channel_id: u64,
    roles_and_admin: Option<(Vec<u64>, bool)>,
) -> Caller {
    let (role_ids, is_admin) = roles_and_admin.unwrap_or_default();
    Caller {
        user_id,
        guild_id,
        channel_id,
        role_ids,
        is_admin,
    }
}

fn command_caller(command: &CommandInteraction) -> Caller {
    caller_of(
        command.user.id.get(),
        command.guild_id.map(|id| id.get()),
        command.channel_id.get(),
        command.member.as_ref().map(|member| {
            (
                member.roles.iter().map(|role| role.get()).collect(),
                member.permissions.is_some_and(|p| p.administrator()),
            )
        }),
    )
}

fn option<'a>(command: &'a CommandInteraction, name: &str) -> Option<&'a CommandDataOptionValue> {
    command
        .data
        .options
        .iter()
        .find(|option| option.name == name)
        .map(|option| &option.value)
}

fn string_option(command: &CommandInteraction, name: &str) -> Option<String> {
    option(command, name)
        .and_then(|value| value.as_str())
        .map(String::from)
}

fn snowflake_option(command: &CommandInteraction, name: &str) -> Option<u64> {
    option(command, name).and_then(|value| match value {
        CommandDataOptionValue::Channel(id) => Some(id.get()),
        CommandDataOptionValue::Role(id) => Some(id.get()),
        CommandDataOptionValue::User(id) => Some(id.get()),
        _ => None,
    })
}

/// Routes any interaction to its handler; failures are logged, never raised.
pub async fn handle_interaction(ctx: &Context, engine: &LifecycleEngine, interaction: Interaction) {
    match interaction {
        Interaction::Command(command) => handle_command(ctx, engine, &command).await,
        Interaction::Component(component) => handle_component(ctx, engine, &component).await,
        Interaction::Modal(modal) => handle_modal(ctx, engine, &modal).await,
        other => debug!("ignoring interaction {:?}", other.kind()),
    }
}

async fn handle_command(ctx: &Context, engine: &LifecycleEngine, command: &CommandInteraction) {
    let name = command.data.name.as_str();
    let caller = command_caller(command);
    info!(
        "command {} from {} in channel {}",
        name, caller.user_id, caller.channel_id
    );

    // creds may answer with a modal, which cannot follow a deferral
    if name == CREDS {
        respond_creds(ctx, engine, command, &caller).await;
        return;
    }

    let ephemeral = match name {
        NEXT_CTFS => option(command, "ephemeral")
            .and_then(|value| value.as_bool())
            .unwrap_or(true),
        VOTE => false,
        _ => true,
    };
    let started = Instant::now();
    let deferred = if ephemeral {
        command.defer_ephemeral(&ctx.http).await
    } else {
        command.defer(&ctx.http).await
    };
    if let Err(e) = deferred {
        error!("failed to defer command {}: {}", name, e);
        return;
    }

    let reply = match name {
        INIT => init(engine, command, &caller).await,
        CREATE => match option(command, "ctftime_id").and_then(|v| v.as_i64()) {
            Some(ctftime_id) => engine
                .create_ctf(&caller, ctftime_id)
                .await
                .map(|_| Reply::Text(String::from("CTF created in the discord server ✅"))),
            None => Err(Error::InvalidInput(String::from("Missing CTFtime id."))),
        },
        FLAG => {
            let flag = string_option(command, "flag").unwrap_or_default();
            let mate = snowflake_option(command, "mate");
            let challenge = string_option(command, "challenge_name");
            engine
                .submit_flag(&caller, &flag, mate, challenge.as_deref())
                .await
                .map(|receipt| {
                    Reply::Text(format!(
                        "Flag registered successfully! ✅\nTotal solves for this CTF: {}",
                        receipt.solves
                    ))
                })
        }
        DELETE_FLAG => engine.delete_flag(&caller).await.map(|solves| match solves {
            Some(solves) => Reply::Text(format!(
                "Flag deleted successfully ✅\nTotal solves for this CTF: {}",
                solves
            )),
            None => Reply::Text(String::from("No flags were registered for this CTF yet.")),
        }),
        REPORT => engine
            .report(&caller)
            .await
            .map(|(ctf, report)| Reply::Embed(LifecycleEngine::report_embed(&ctf, &report))),
        VOTE => engine.start_vote(&caller).await.map(|posted| {
            Reply::Text(format!(
                "Vote created with {} CTFs ✅",
                posted.candidates.len()
            ))
        }),
        NEXT_CTFS => {
            let limit = option(command, "limit")
                .and_then(|value| value.as_i64())
                .map(|limit| limit.max(1) as usize);
            engine.next_ctfs(limit).await.map(Reply::Embed)
        }
        CHALL => {
            let challenge = Challenge {
                name: string_option(command, "name").unwrap_or_default(),
                category: string_option(command, "category"),
                description: string_option(command, "description"),
            };
            engine
                .chall(&caller, challenge)
                .await
                .map(|_| Reply::Text(String::from("Thread created successfully! ✅")))
        }
        DELETE_CREDS => engine
            .delete_creds(&caller)
            .await
            .map(|_| Reply::Text(String::from("Credential removed correctly ✅"))),
        REMOVE => engine.list_ctfs(&caller).await.map(Reply::RemoveMenu),
        PING => Ok(Reply::Text(format!(
            "Latency: {}ms",
            started.elapsed().as_millis()
        ))),
        VERSION => Ok(Reply::Text(format!(
            "Version: {}\nCommit: {}",
            env!("CARGO_PKG_VERSION"),
            option_env!("CTFHELPER_COMMIT").unwrap_or("unknown")
        ))),
        unknown => {
            warn!("unknown command {}", unknown);
            Err(Error::InvalidInput(String::from("Unknown command.")))
        }
    };

    let response = match reply {
        Ok(Reply::Text(content)) => EditInteractionResponse::new().content(content),
        Ok(Reply::Embed(embed)) => EditInteractionResponse::new().embed(build_embed(embed)),
        Ok(Reply::RemoveMenu(ctfs)) if ctfs.is_empty() => {
            EditInteractionResponse::new().content("There are no CTFs to remove. ❌")
        }
        Ok(Reply::RemoveMenu(ctfs)) => EditInteractionResponse::new()
            .content("Select a CTF:")
            .components(vec![remove_menu(&ctfs)]),
        Err(e) => {
            error!("command {} failed: {}", name, e);
            EditInteractionResponse::new().content(e.user_message())
        }
    };
    if let Err(e) = command.edit_response(&ctx.http, response).await {
        error!("failed to answer command {}: {}", name, e);
    }
}

async fn init(
    engine: &LifecycleEngine,
    command: &CommandInteraction,
    caller: &Caller,
) -> Result<Reply, Error> {
    let guild_id = caller.guild()?;
    let config = ServerConfig {
        guild_id,
        active_category_id: snowflake_option(command, "category_active"),
        archive_category_id: snowflake_option(command, "category_archived"),
        manager_role_id: snowflake_option(command, "role_manager"),
        feed_channel_id: snowflake_option(command, "feed_channel"),
        team_id: option(command, "team_id").and_then(|value| value.as_i64()),
        team_role_id: snowflake_option(command, "role_team"),
    };
    engine.init_server(caller, config).await?;
    Ok(Reply::Text(String::from(
        "Successfully configured the bot! ✅",
    )))
}

fn remove_menu(ctfs: &[Ctf]) -> CreateActionRow {
    let options = ctfs
        .iter()
        .take(MAX_SELECT_OPTIONS)
        .map(|ctf| CreateSelectMenuOption::new(ctf.name.clone(), ctf.id.to_string()))
        .collect();
    CreateActionRow::SelectMenu(
        CreateSelectMenu::new(REMOVE_SELECT_ID, CreateSelectMenuKind::String { options })
            .placeholder("No CTF selected"),
    )
}

async fn respond_creds(
    ctx: &Context,
    engine: &LifecycleEngine,
    command: &CommandInteraction,
    caller: &Caller,
) {
    let response = match engine.creds(caller).await {
        Ok(CredsLookup::Missing { modal_id }) => CreateInteractionResponse::Modal(creds_modal(modal_id)),
        Ok(CredsLookup::Found(embed)) => CreateInteractionResponse::Message(
            CreateInteractionResponseMessage::new()
                .embed(build_embed(embed))
                .ephemeral(true),
        ),
        Err(e) => {
            error!("creds lookup failed: {}", e);
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .content(e.user_message())
                    .ephemeral(true),
            )
        }
    };
    if let Err(e) = command.create_response(&ctx.http, response).await {
        error!("failed to answer creds command: {}", e);
    }
}

fn creds_modal(modal_id: String) -> CreateModal {
    let input = |label: &str, id: &str, placeholder: &str| {
        CreateActionRow::InputText(
            CreateInputText::new(InputTextStyle::Short, label, id)
                .placeholder(placeholder)
                .required(true),
        )
    };
    CreateModal::new(modal_id, "Credentials Form").components(vec![
        input("Username", "username", "Enter the username"),
        input("Password", "password", "Enter the password"),
        input("Personal", "personal", "yes/no"),
    ])
}

async fn handle_component(
    ctx: &Context,
    engine: &LifecycleEngine,
    component: &ComponentInteraction,
) {
    if component.data.custom_id != REMOVE_SELECT_ID {
        debug!("ignoring component {}", component.data.custom_id);
        return;
    }
    let caller = caller_of(
        component.user.id.get(),
        component.guild_id.map(|id| id.get()),
        component.channel_id.get(),
        component.member.as_ref().map(|member| {
            (
                member.roles.iter().map(|role| role.get()).collect(),
                member.permissions.is_some_and(|p| p.administrator()),
            )
        }),
    );
    let selected = match &component.data.kind {
        ComponentInteractionDataKind::StringSelect { values } => values.first().cloned(),
        _ => None,
    };

    let content = match selected {
        Some(selector) => match engine.remove_ctf(&caller, &selector).await {
            Ok(report) => {
                info!("removal of ctf {}: {:?}", report.ctf.id, report);
                String::from("CTF removed successfully ✅.")
            }
            Err(e) => {
                error!("removal of {} failed: {}", selector, e);
                e.user_message()
            }
        },
        None => String::from("Error processing selection. ❌"),
    };

    let response = CreateInteractionResponse::Message(
        CreateInteractionResponseMessage::new()
            .content(content)
            .ephemeral(true),
    );
    if let Err(e) = component.create_response(&ctx.http, response).await {
        error!("failed to answer remove selection: {}", e);
    }
}

fn modal_value(modal: &ModalInteraction, id: &str) -> Option<String> {
    modal
        .data
        .components
        .iter()
        .flat_map(|row| row.components.iter())
        .find_map(|component| match component {
            ActionRowComponent::InputText(input) if input.custom_id == id => input.value.clone(),
            _ => None,
        })
}

async fn handle_modal(ctx: &Context, engine: &LifecycleEngine, modal: &ModalInteraction) {
    let caller = caller_of(
        modal.user.id.get(),
        modal.guild_id.map(|id| id.get()),
        modal.channel_id.get(),
        None,
    );
    let username = modal_value(modal, "username").unwrap_or_default();
    let password = SecretString::from(modal_value(modal, "password").unwrap_or_default());
    let personal = modal_value(modal, "personal").unwrap_or_default();

    let (content, ephemeral) = match engine
        .submit_creds(&caller, &modal.data.custom_id, username, password, &personal)
        .await
    {
        Ok(announcement) => (announcement, false),
        Err(e) => {
            error!("credentials form {} failed: {}", modal.data.custom_id, e);
            (e.user_message(), true)
        }
    };

    let response = CreateInteractionResponse::Message(
        CreateInteractionResponseMessage::new()
            .content(content)
            .ephemeral(ephemeral),
    );
    if let Err(e) = modal.create_response(&ctx.http, response).await {
        error!("failed to answer credentials form: {}", e);
    }
}
