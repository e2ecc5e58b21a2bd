use std::time::Duration;

use craftlink::{
    CancelToken, ChannelState, Client, ClientConfig, ClientError, Credentials, ErrorKind,
    NoProgress, Status,
    batch::FailureCause,
    error::ChannelError,
    model::{Block, Location},
    protocol::{LocationRecord, PlayerRecord, StubHandle, StubOptions, StubServer},
};

fn client_for(stub: &StubHandle) -> Client {
    Client::new(
        ClientConfig::default()
            .with_port(stub.addr.port())
            .with_request_timeout(Duration::from_secs(5)),
    )
}

fn guarded() -> StubHandle {
    StubServer::spawn(StubOptions {
        credentials: Some(Credentials::new("Admin", "secret")),
        ..StubOptions::default()
    })
    .unwrap()
}

#[test]
fn say_hello_with_valid_credentials() {
    let stub = guarded();
    let client = client_for(&stub);
    client
        .connect(Some(&Credentials::new("Admin", "secret")))
        .unwrap();

    let reply = client.execute_command("say hello world!").unwrap();
    assert_eq!(reply.status, Status::Success);
    assert_eq!(reply.value[0].message, "hello world!");
    assert!(reply.value[0].success);
}

#[test]
fn invalid_credentials_fail_the_connect() {
    let stub = guarded();
    let client = client_for(&stub);

    let err = client
        .connect(Some(&Credentials::new("Admin", "wrong")))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authentication);
    assert_eq!(client.state(), ChannelState::Disconnected);
    assert!(stub.stats.commands().is_empty());
}

#[test]
fn written_blocks_read_back() {
    let stub = StubServer::spawn(StubOptions::default()).unwrap();
    let client = client_for(&stub);
    client.connect(None).unwrap();

    let origin = Location::new(0, 0, 0);
    let reply = client.set_block(&Block::new("stone", origin)).unwrap();
    assert_eq!(reply.status, Status::Success);

    let block = client.get_block(origin).unwrap().value.unwrap();
    assert_eq!(block.name(), "stone");
    assert_eq!(block.namespace(), "minecraft");
    assert_eq!(block.location(), origin);
}

#[test]
fn stateful_blocks_keep_their_state() {
    let stub = StubServer::spawn(StubOptions::default()).unwrap();
    let client = client_for(&stub);
    client.connect(None).unwrap();

    let at = Location::new(4, 65, -2);
    let stairs = Block::builder("oak_stairs", at)
        .state("facing", "north")
        .state("half", "top")
        .build();
    client.set_blocks(&[stairs.clone()], None).unwrap();

    let lookups = client.get_blocks(&[at, at.offset(0, 1, 0)]).unwrap().value;
    assert_eq!(lookups[0].block.as_ref(), Some(&stairs));
    assert_eq!(lookups[1].block, None);
}

#[test]
fn malformed_block_data_is_a_partial_success() {
    let stub = StubServer::spawn(StubOptions::default()).unwrap();
    let client = client_for(&stub);
    client.connect(None).unwrap();

    let reply = client
        .set_blocks(
            &[
                Block::new("stone", Location::new(0, 1, 0)),
                Block::builder("stone", Location::new(0, 2, 0))
                    .state("", "x")
                    .build(),
            ],
            None,
        )
        .unwrap();

    assert_eq!(reply.status, Status::PartialSuccess);
    assert!(reply.value[0].success);
    assert!(!reply.value[1].success);
    assert!(reply.value[1].exception.is_some());
}

#[test]
fn players_are_filtered_by_presence() {
    let spawn = LocationRecord {
        world: "world".to_string(),
        x: 10,
        y: 64,
        z: -3,
    };
    let stub = StubServer::spawn(StubOptions {
        players: vec![
            PlayerRecord::online("Steve", "uuid-1", spawn),
            PlayerRecord::offline("Alex", "uuid-2"),
        ],
        ..StubOptions::default()
    })
    .unwrap();
    let client = client_for(&stub);
    client.connect(None).unwrap();

    let online = client.get_players(true).unwrap().value;
    assert_eq!(online.len(), 1);
    assert_eq!(online[0].name, "Steve");
    let at = online[0].location.as_ref().unwrap();
    assert_eq!(at.block(), Location::new(10, 64, -3));

    let everybody = client.get_players(false).unwrap().value;
    assert_eq!(everybody.len(), 2);
    assert!(!everybody[1].is_online());
}

#[test]
fn timeout_disconnects_without_reconnecting() {
    let stub = StubServer::spawn(StubOptions {
        stall_set_blocks_after: Some(0),
        stall_for: Duration::from_secs(2),
        ..StubOptions::default()
    })
    .unwrap();
    let client = client_for(&stub);
    client.connect(None).unwrap();

    let err = client
        .set_blocks(
            &[Block::new("stone", Location::ORIGIN)],
            Some(Duration::from_millis(200)),
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert_eq!(client.state(), ChannelState::Disconnected);

    let err = client.ping().unwrap_err();
    assert!(matches!(
        err,
        ClientError::Channel(ChannelError::NotConnected)
    ));

    client.connect(None).unwrap();
    assert_eq!(client.ping().unwrap().status, Status::Success);
}

#[test]
fn batch_stops_at_the_first_failed_chunk() {
    let stub = StubServer::spawn(StubOptions {
        stall_set_blocks_after: Some(1),
        stall_for: Duration::from_secs(2),
        ..StubOptions::default()
    })
    .unwrap();
    let client = Client::new(
        ClientConfig::default()
            .with_port(stub.addr.port())
            .with_chunk_size(1)
            .with_request_timeout(Duration::from_millis(300)),
    );
    client.connect(None).unwrap();

    let blocks = [
        Block::new("stone", Location::new(0, 0, 0)),
        Block::new("dirt", Location::new(1, 0, 0)),
        Block::new("glass", Location::new(2, 0, 0)),
    ];
    let result = client
        .run_batch(&blocks, &NoProgress, &CancelToken::new())
        .unwrap();

    assert_eq!(result.total, 3);
    assert_eq!(result.applied, 1);
    assert_eq!(result.chunks_sent, 2);
    assert_eq!(result.failed_at(), Some(1));
    let failure = result.failure.unwrap();
    assert!(matches!(
        failure.cause,
        FailureCause::Channel(ChannelError::Timeout(_))
    ));
    assert_eq!(stub.stats.set_block_requests(), 2);
    assert_eq!(client.state(), ChannelState::Disconnected);
}

#[test]
fn batch_of_many_blocks_lands_in_order() {
    let stub = StubServer::spawn(StubOptions::default()).unwrap();
    let client = Client::new(
        ClientConfig::default()
            .with_port(stub.addr.port())
            .with_chunk_size(7),
    );
    client.connect(None).unwrap();

    let column = (0..50)
        .map(|y| Block::new(if y % 2 == 0 { "stone" } else { "dirt" }, Location::new(5, y, 5)))
        .collect::<Vec<_>>();
    let result = client
        .run_batch(&column, &NoProgress, &CancelToken::new())
        .unwrap();

    assert!(result.is_complete());
    assert_eq!(result.applied, 50);
    assert_eq!(result.chunks_sent, 8);
    assert_eq!(stub.stats.set_block_requests(), 8);

    let locations = column.iter().map(Block::location).collect::<Vec<_>>();
    let lookups = client.get_blocks(&locations).unwrap().value;
    let names = lookups
        .iter()
        .map(|l| l.block.as_ref().map(|b| b.name().to_string()))
        .collect::<Vec<_>>();
    let expected = column
        .iter()
        .map(|b| Some(b.name().to_string()))
        .collect::<Vec<_>>();
    assert_eq!(names, expected);
}

#[test]
fn structured_commands_render_before_sending() {
    use craftlink::{Command, StructuredCommand, command::Position};

    let stub = StubServer::spawn(StubOptions::default()).unwrap();
    let client = client_for(&stub);
    client.connect(None).unwrap();

    let fill = StructuredCommand::fill(
        Position::new(3, 70, 3),
        Position::new(0, 64, 0),
        "stone",
    );
    let give = Command::from(StructuredCommand::give("Steve", "diamond", 2));
    let reply = client
        .execute_commands(&[fill.into(), give, Command::text("time set day")])
        .unwrap();
    assert_eq!(reply.value.len(), 3);

    let seen = stub.stats.commands();
    assert_eq!(seen[0], "fill 0 64 0 3 70 3 stone");
    assert_eq!(seen[1], "give Steve diamond 2");
    assert_eq!(seen[2], "time set day");
}

#[test]
fn concurrent_callers_read_their_own_writes() {
    const IDS: [&str; 8] = [
        "stone",
        "dirt",
        "glass",
        "sand",
        "gravel",
        "oak_planks",
        "cobblestone",
        "bricks",
    ];

    let stub = StubServer::spawn(StubOptions::default()).unwrap();
    let client = client_for(&stub);
    client.connect(None).unwrap();

    std::thread::scope(|scope| {
        for (x, id) in IDS.into_iter().enumerate() {
            let client = &client;
            scope.spawn(move || {
                for y in 0..25 {
                    let at = Location::new(x as i32, y, 0);
                    client.set_block(&Block::new(id, at)).unwrap();
                    let back = client.get_block(at).unwrap().value.unwrap();
                    assert_eq!(back.name(), id);
                }
            });
        }
    });

    assert_eq!(stub.stats.set_block_requests(), 200);
    assert_eq!(client.state(), ChannelState::Ready);
}
