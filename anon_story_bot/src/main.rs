use arch_bot_commons::*;

fn main() -> std::process::ExitCode {
    start_everything("WARN,anon_story_bot=debug", anon_story_bot::entry())
}
