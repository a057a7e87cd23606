//! Interpreter tests against a recording transport.

use std::io::Write;
use std::sync::Arc;

use commander_command::{CommandError, CommandInterpreter, PrefixInterlock, send_bootstrap};
use commander_common::config::InterlockSection;
use commander_common::prelude::*;
use parking_lot::Mutex;

type Mail = Arc<Mutex<Vec<Envelope>>>;

fn setup() -> (Arc<MessageBus>, Arc<CommandCatalog>, Mail) {
    let bus = Arc::new(MessageBus::new());
    let catalog = CatalogCell::new().get_or_build().unwrap();
    let mail: Mail = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&mail);
    bus.register(
        SubscriberId::new(TRANSPORT_ID).unwrap(),
        move |env: Envelope| -> Result<(), BusError> {
            sink.lock().push(env);
            Ok(())
        },
    );
    (bus, catalog, mail)
}

fn commands(mail: &Mail) -> Vec<LowLevelCommand> {
    mail.lock()
        .iter()
        .map(|env| match env.content() {
            Payload::Command(cmd) => cmd.clone(),
            other => panic!("unexpected payload {other}"),
        })
        .collect()
}

#[test]
fn multi_axis_send_posts_one_envelope_per_axis() {
    let (bus, catalog, mail) = setup();
    let interp = CommandInterpreter::new(bus, catalog).unwrap();

    let posted = interp
        .send("set_inc", "x&y", &["3.5".to_string()], true)
        .unwrap();
    assert_eq!(posted, 2);

    let mail_guard = mail.lock();
    assert_eq!(mail_guard.len(), 2);
    for env in mail_guard.iter() {
        assert_eq!(env.destination().as_str(), TRANSPORT_ID);
        assert_eq!(env.source().as_str(), INTERPRETER_ID);
    }
    drop(mail_guard);

    let cmds = commands(&mail);
    assert_eq!(cmds[0].axis, ComponentKeyword::X);
    assert_eq!(cmds[1].axis, ComponentKeyword::Y);
    assert!(cmds.iter().all(|c| c.params == vec!["3.5".to_string()]));
}

#[test]
fn single_axis_send_posts_one_envelope() {
    let (bus, catalog, mail) = setup();
    let interp = CommandInterpreter::new(bus, catalog).unwrap();

    assert_eq!(interp.send("z_up", "z", &[], true).unwrap(), 1);
    assert_eq!(
        commands(&mail),
        vec![LowLevelCommand::new("z_up", ComponentKeyword::Z, vec![], true)]
    );
}

#[test]
fn unknown_command_posts_nothing() {
    let (bus, catalog, mail) = setup();
    let interp = CommandInterpreter::new(bus, catalog).unwrap();

    let err = interp.send("fly", "x", &[], true).unwrap_err();
    assert!(matches!(err, CommandError::UnknownCommand { .. }));
    assert!(mail.lock().is_empty());
}

#[test]
fn missing_transport_surfaces_unknown_destination() {
    let bus = Arc::new(MessageBus::new());
    let catalog = Arc::new(CommandCatalog::standard().unwrap());
    let interp = CommandInterpreter::new(bus, catalog).unwrap();

    let err = interp.send("inc_left", "x", &[], true).unwrap_err();
    assert_eq!(
        err,
        CommandError::Bus(BusError::UnknownDestination {
            id: TRANSPORT_ID.to_string()
        })
    );
}

#[test]
fn configured_interlock_raises_z_before_moves() {
    let (bus, catalog, mail) = setup();
    let section: InterlockSection = toml::from_str(
        r#"
        guarded = ["to_point"]
        prefix = [{ name = "z_up", axis = "z" }]
        "#,
    )
    .unwrap();
    let interp = CommandInterpreter::new(bus, catalog)
        .unwrap()
        .with_stage(PrefixInterlock::from_section(&section));

    let params = vec!["1".to_string(), "2".to_string()];
    assert_eq!(interp.send("to_point", "x&y", &params, true).unwrap(), 3);

    let cmds = commands(&mail);
    let order: Vec<(&str, ComponentKeyword)> =
        cmds.iter().map(|c| (c.name.as_str(), c.axis)).collect();
    assert_eq!(
        order,
        vec![
            ("z_up", ComponentKeyword::Z),
            ("to_point", ComponentKeyword::X),
            ("to_point", ComponentKeyword::Y),
        ]
    );
    assert!(cmds[0].blocking);
}

#[test]
fn bootstrap_pushes_directory_addresses() {
    let (bus, catalog, mail) = setup();
    let interp = CommandInterpreter::new(bus, catalog).unwrap();

    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"[{{"m": "Marshaller", "x": "X axis"}}, {{"m": "aa:bb:cc:dd:ee:ff", "x": "11:22:33:44:55:66"}}]"#
    )
    .unwrap();
    let directory = JsonComponentStore::load(file.path()).unwrap();

    assert_eq!(send_bootstrap(&interp, &directory).unwrap(), 1);
    assert_eq!(
        commands(&mail),
        vec![LowLevelCommand::new(
            "set_axis_mac_ids",
            ComponentKeyword::M,
            vec![
                "m=aa:bb:cc:dd:ee:ff".to_string(),
                "x=11:22:33:44:55:66".to_string()
            ],
            false
        )]
    );
}
