use log::info;
use serenity::all::{
    ChannelType, Command, CommandOptionType, CreateCommand, CreateCommandOption, GuildId, Http,
    Permissions,
};

pub const INIT: &str = "init";
pub const CREATE: &str = "create";
pub const FLAG: &str = "flag";
pub const DELETE_FLAG: &str = "delete-flag";
pub const REPORT: &str = "report";
pub const VOTE: &str = "vote";
pub const NEXT_CTFS: &str = "next-ctfs";
pub const CHALL: &str = "chall";
pub const CREDS: &str = "creds";
pub const DELETE_CREDS: &str = "delete-creds";
pub const REMOVE: &str = "remove";
pub const PING: &str = "ping";
pub const VERSION: &str = "version";

fn option(kind: CommandOptionType, name: &str, description: &str, required: bool) -> CreateCommandOption {
    CreateCommandOption::new(kind, name, description).required(required)
}

fn guild_command(name: &str, description: &str) -> CreateCommand {
    CreateCommand::new(name).description(description).dm_permission(false)
}

/// Every slash command the bot answers.
pub fn command_definitions() -> Vec<CreateCommand> {
    vec![
        guild_command(INIT, "Initialize the CTF bot in the discord server.")
            .default_member_permissions(Permissions::ADMINISTRATOR)
            .add_option(
                option(
                    CommandOptionType::Channel,
                    "category_active",
                    "The category for the next or current ctf",
                    true,
                )
                .channel_types(vec![ChannelType::Category]),
            )
            .add_option(
                option(
                    CommandOptionType::Channel,
                    "category_archived",
                    "The category for the archived ctf",
                    true,
                )
                .channel_types(vec![ChannelType::Category]),
            )
            .add_option(option(
                CommandOptionType::Role,
                "role_manager",
                "The only role that can run the create command",
                true,
            ))
            .add_option(
                option(
                    CommandOptionType::Channel,
                    "feed_channel",
                    "The channel feed for publishing the ctf",
                    true,
                )
                .channel_types(vec![ChannelType::Text, ChannelType::News]),
            )
            .add_option(option(
                CommandOptionType::Integer,
                "team_id",
                "The id of the team on CTFtime",
                true,
            ))
            .add_option(option(
                CommandOptionType::Role,
                "role_team",
                "The role of the team for tagging purposes",
                true,
            )),
        guild_command(CREATE, "Create a CTF event in the discord server.").add_option(
            option(
                CommandOptionType::Integer,
                "ctftime_id",
                "The id of the event on CTFtime",
                true,
            )
            .min_int_value(1),
        ),
        guild_command(FLAG, "Register a flag in the ctf.")
            .add_option(option(CommandOptionType::String, "flag", "The flag.", true))
            .add_option(option(
                CommandOptionType::User,
                "mate",
                "If you solved the challenge together with someone, specify their tag",
                false,
            ))
            .add_option(option(
                CommandOptionType::String,
                "challenge_name",
                "The challenge name",
                false,
            )),
        guild_command(DELETE_FLAG, "Delete a flag in the ctf."),
        guild_command(REPORT, "Generate a report for the current CTF."),
        guild_command(VOTE, "Create a poll over the CTFs of this week."),
        guild_command(NEXT_CTFS, "List the next ctfs on ctftime.")
            .add_option(option(
                CommandOptionType::Boolean,
                "ephemeral",
                "Whether the response should be ephemeral or not (default: True)",
                false,
            ))
            .add_option(
                option(
                    CommandOptionType::Integer,
                    "limit",
                    "The maximum number of CTFs to display (default: 5, max: 10)",
                    false,
                )
                .min_int_value(1)
                .max_int_value(10),
            ),
        guild_command(CHALL, "Create a thread to discuss a challenge")
            .add_option(option(
                CommandOptionType::String,
                "name",
                "The name of the challenge",
                true,
            ))
            .add_option(option(
                CommandOptionType::String,
                "description",
                "The description of the challenge",
                false,
            ))
            .add_option(option(
                CommandOptionType::String,
                "category",
                "The category of the challenge",
                false,
            )),
        guild_command(CREDS, "Show or set up the credentials for the ctf."),
        guild_command(DELETE_CREDS, "Delete the credentials for the ctf."),
        guild_command(REMOVE, "Remove a CTF event from the discord server."),
        CreateCommand::new(PING).description("Ping the bot to check if it's alive"),
        CreateCommand::new(VERSION).description("Show the running version"),
    ]
}

/// Registers the commands in each dev guild, or globally when there are none.
pub async fn register_commands(http: &Http, dev_guilds: &[u64]) -> Result<(), serenity::Error> {
    if dev_guilds.is_empty() {
        let commands = Command::set_global_commands(http, command_definitions()).await?;
        info!("registered {} global commands", commands.len());
        return Ok(());
    }
    for guild_id in dev_guilds {
        let commands = GuildId::new(*guild_id)
            .set_commands(http, command_definitions())
            .await?;
        info!("registered {} commands in guild {}", commands.len(), guild_id);
    }
    Ok(())
}

/// Drops every registered command, globally and in the dev guilds.
pub async fn clean_commands(http: &Http, dev_guilds: &[u64]) -> Result<(), serenity::Error> {
    Command::set_global_commands(http, Vec::new()).await?;
    for guild_id in dev_guilds {
        GuildId::new(*guild_id).set_commands(http, Vec::new()).await?;
    }
    info!("removed global commands and commands of {} guilds", dev_guilds.len());
    Ok(())
}
