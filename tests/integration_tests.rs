//! Integration tests for a host and its participants
//!
//! Every test runs a real host loop on loopback TCP with an in-memory
//! rendezvous and talks to it through the client's host link, the same
//! channel the participant binary uses.

use client::network::{ClientEvent, HostLink, CONNECT_TIMEOUT};
use host::content::{ContentBundle, ContentProvider, ContentRequest};
use host::network::{HostConfig, OperatorHandle, Server};
use host::operator::OperatorCommand;
use host::session::{HostPhase, HostSnapshot};
use shared::{Language, MemoryRendezvous, NetworkMessage, Question, Rendezvous, RoomCode, SessionError};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};

const WAIT: Duration = Duration::from_secs(5);

/// Serves the same questions for every request
struct FixedQuiz(Vec<Question>);

impl ContentProvider for FixedQuiz {
    fn generate(
        &self,
        request: ContentRequest,
    ) -> impl Future<Output = Result<ContentBundle, SessionError>> + Send {
        let bundle = ContentBundle {
            topic: request.topic,
            cover_ref: None,
            difficulty: request.difficulty,
            questions: self.0.clone(),
        };
        async move { Ok(bundle) }
    }
}

fn question(text: &str, correct_index: u8, time_limit_seconds: u32) -> Question {
    Question {
        text: text.to_string(),
        options: [
            "Venus".to_string(),
            "Mars".to_string(),
            "Jupiter".to_string(),
            "Mercury".to_string(),
        ],
        correct_index,
        time_limit_seconds,
        explanation: None,
        image_ref: None,
    }
}

struct TestHost {
    operator: OperatorHandle,
    rendezvous: MemoryRendezvous,
    room: RoomCode,
}

impl TestHost {
    async fn start(config: HostConfig, questions: Vec<Question>) -> Self {
        let rendezvous = MemoryRendezvous::new();
        let mut server = Server::bind(config, Arc::new(rendezvous.clone()), FixedQuiz(questions))
            .await
            .unwrap();
        let operator = server.operator();
        tokio::spawn(async move { server.run().await });

        operator
            .send(OperatorCommand::Generate(Some("Planets".to_string())))
            .unwrap();

        let room = timeout(WAIT, async {
            loop {
                let snapshot = operator.snapshot().await.unwrap();
                if let (HostPhase::Lobby, Some(room)) = (snapshot.phase, snapshot.room) {
                    return room;
                }
                sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("lobby never opened");

        TestHost {
            operator,
            rendezvous,
            room,
        }
    }

    async fn link(&self) -> HostLink {
        HostLink::connect(&self.rendezvous, &self.room, CONNECT_TIMEOUT)
            .await
            .unwrap()
    }

    /// Connects and joins, returning the link and the assigned player id
    async fn join(&self, name: &str) -> (HostLink, String) {
        let mut link = self.link().await;
        tokio_test::assert_ok!(link.send(&join_message(name)).await);
        match expect_message(&mut link).await {
            NetworkMessage::Welcome { player_id, .. } => (link, player_id),
            other => panic!("expected WELCOME, got {:?}", other),
        }
    }

    fn command(&self, command: OperatorCommand) {
        self.operator.send(command).unwrap();
    }

    async fn snapshot(&self) -> HostSnapshot {
        self.operator.snapshot().await.unwrap()
    }
}

fn config() -> HostConfig {
    HostConfig {
        language: Language::En,
        ..HostConfig::default()
    }
}

fn join_message(name: &str) -> NetworkMessage {
    NetworkMessage::Join {
        name: name.to_string(),
        avatar: "🦊".to_string(),
    }
}

async fn expect_message(link: &mut HostLink) -> NetworkMessage {
    match timeout(WAIT, link.recv()).await {
        Ok(ClientEvent::Message(message)) => message,
        Ok(other) => panic!("expected a message, got {:?}", other),
        Err(_) => panic!("no message within {:?}", WAIT),
    }
}

/// Asserts nothing arrives for a short while
async fn expect_silence(link: &mut HostLink) {
    if let Ok(event) = timeout(Duration::from_millis(200), link.recv()).await {
        panic!("expected silence, got {:?}", event);
    }
}

mod session_flow {
    use super::*;

    #[tokio::test]
    async fn two_players_play_one_round() {
        let host = TestHost::start(config(), vec![question("Red planet?", 1, 30)]).await;
        let (mut ava, ava_id) = host.join("Ava").await;
        let (mut ben, _) = host.join("Ben").await;

        host.command(OperatorCommand::Start);
        for link in [&mut ava, &mut ben] {
            assert_eq!(expect_message(link).await, NetworkMessage::StartGame);
            match expect_message(link).await {
                NetworkMessage::QuestionStart {
                    round_index,
                    total_rounds,
                    question,
                } => {
                    assert_eq!((round_index, total_rounds), (1, 1));
                    assert_eq!(question.text, "Red planet?");
                }
                other => panic!("expected QUESTION_START, got {:?}", other),
            }
        }

        tokio_test::assert_ok!(ava.send(&NetworkMessage::Answer { answer_index: 1 }).await);
        tokio_test::assert_ok!(ben.send(&NetworkMessage::Answer { answer_index: -1 }).await);

        // Everyone answered, so the round ends without waiting for the clock
        let ava_score = match expect_message(&mut ava).await {
            NetworkMessage::RoundEnd {
                correct_index,
                score,
                streak,
                points_this_round,
                was_correct,
            } => {
                assert_eq!(correct_index, 1);
                assert!(was_correct);
                assert_eq!(streak, 1);
                assert!(points_this_round >= 1000);
                assert_eq!(score, points_this_round);
                score
            }
            other => panic!("expected ROUND_END, got {:?}", other),
        };
        match expect_message(&mut ben).await {
            NetworkMessage::RoundEnd {
                score,
                streak,
                points_this_round,
                was_correct,
                ..
            } => {
                assert!(!was_correct);
                assert_eq!((score, streak, points_this_round), (0, 0, 0));
            }
            other => panic!("expected ROUND_END, got {:?}", other),
        }

        let snapshot = host.snapshot().await;
        assert_eq!(snapshot.phase, HostPhase::Feedback);
        assert_eq!(snapshot.standings[0].player_id, ava_id);
        assert_eq!(snapshot.standings[0].score, ava_score);

        host.command(OperatorCommand::Leaderboard);
        assert_eq!(expect_message(&mut ava).await, NetworkMessage::ShowLeaderboard);
        assert_eq!(expect_message(&mut ben).await, NetworkMessage::ShowLeaderboard);

        host.command(OperatorCommand::Next);
        assert_eq!(expect_message(&mut ava).await, NetworkMessage::GameOver { rank: 1 });
        assert_eq!(expect_message(&mut ben).await, NetworkMessage::GameOver { rank: 2 });
        assert_eq!(host.snapshot().await.phase, HostPhase::GameOver);
    }

    #[tokio::test]
    async fn round_ends_when_the_clock_runs_out() {
        let config = HostConfig {
            tick_duration: Duration::from_millis(20),
            ..config()
        };
        let host = TestHost::start(config, vec![question("Gas giant?", 2, 2)]).await;
        let (mut ava, _) = host.join("Ava").await;

        host.command(OperatorCommand::Start);
        assert_eq!(expect_message(&mut ava).await, NetworkMessage::StartGame);
        assert!(matches!(
            expect_message(&mut ava).await,
            NetworkMessage::QuestionStart { .. }
        ));

        match expect_message(&mut ava).await {
            NetworkMessage::RoundEnd {
                correct_index,
                was_correct,
                points_this_round,
                ..
            } => {
                assert_eq!(correct_index, 2);
                assert!(!was_correct);
                assert_eq!(points_this_round, 0);
            }
            other => panic!("expected ROUND_END, got {:?}", other),
        }

        // A late answer is ignored without any reply
        tokio_test::assert_ok!(ava.send(&NetworkMessage::Answer { answer_index: 2 }).await);
        expect_silence(&mut ava).await;
        assert_eq!(host.snapshot().await.standings[0].score, 0);
    }

    #[tokio::test]
    async fn repeated_join_keeps_one_player() {
        let host = TestHost::start(config(), vec![question("Red planet?", 1, 30)]).await;
        let (mut ava, ava_id) = host.join("Ava").await;

        tokio_test::assert_ok!(ava.send(&join_message("Ava")).await);
        match expect_message(&mut ava).await {
            NetworkMessage::Welcome { player_id, topic, .. } => {
                assert_eq!(player_id, ava_id);
                assert_eq!(topic, "Planets");
            }
            other => panic!("expected WELCOME, got {:?}", other),
        }

        let snapshot = host.snapshot().await;
        assert_eq!(snapshot.standings.len(), 1);
        assert_eq!(snapshot.standings[0].name, "Ava");
    }

    #[tokio::test]
    async fn leaving_player_is_removed() {
        let host = TestHost::start(config(), vec![question("Red planet?", 1, 30)]).await;
        let (ava, _) = host.join("Ava").await;
        let (_ben, _) = host.join("Ben").await;
        assert_eq!(host.snapshot().await.standings.len(), 2);

        drop(ava);
        let remaining = timeout(WAIT, async {
            loop {
                let snapshot = host.snapshot().await;
                if snapshot.standings.len() == 1 {
                    return snapshot;
                }
                sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("player was never removed");
        assert_eq!(remaining.standings[0].name, "Ben");
    }

    #[tokio::test]
    async fn restart_closes_the_room() {
        let host = TestHost::start(config(), vec![question("Red planet?", 1, 30)]).await;
        let (mut ava, _) = host.join("Ava").await;
        assert!(host.rendezvous.resolve(&host.room.rendezvous_id()).is_some());

        host.command(OperatorCommand::Restart);
        assert_eq!(timeout(WAIT, ava.recv()).await.unwrap(), ClientEvent::Closed);
        assert!(host.rendezvous.resolve(&host.room.rendezvous_id()).is_none());
        assert_eq!(host.snapshot().await.phase, HostPhase::Welcome);

        let result = HostLink::connect(&host.rendezvous, &host.room, CONNECT_TIMEOUT).await;
        assert!(matches!(result, Err(SessionError::PeerUnavailable { .. })));
    }
}

mod protocol_tests {
    use super::*;
    use shared::protocol::{decode, read_frame};
    use shared::Decoded;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpStream;

    #[tokio::test]
    async fn unknown_message_kind_is_skipped() {
        let host = TestHost::start(config(), vec![question("Red planet?", 1, 30)]).await;
        let addr = host.rendezvous.resolve(&host.room.rendezvous_id()).unwrap();
        let mut stream = TcpStream::connect(addr).await.unwrap();

        // A frame carrying a message kind from a newer build
        stream.write_u32(4).await.unwrap();
        stream.write_all(&99u32.to_le_bytes()).await.unwrap();

        let payload = shared::protocol::encode(&join_message("Ava")).unwrap();
        stream.write_u32(payload.len() as u32).await.unwrap();
        stream.write_all(&payload).await.unwrap();

        let reply = timeout(WAIT, read_frame(&mut stream))
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(matches!(
            decode(&reply).unwrap(),
            Decoded::Message(NetworkMessage::Welcome { .. })
        ));
    }

    #[tokio::test]
    async fn answers_before_join_are_ignored() {
        let host = TestHost::start(config(), vec![question("Red planet?", 1, 30)]).await;
        let mut stranger = host.link().await;

        tokio_test::assert_ok!(stranger.send(&NetworkMessage::Answer { answer_index: 1 }).await);
        expect_silence(&mut stranger).await;
        assert!(host.snapshot().await.standings.is_empty());
    }

    #[tokio::test]
    async fn silent_connection_is_closed_after_join_deadline() {
        let config = HostConfig {
            tick_duration: Duration::from_millis(20),
            join_deadline: Duration::from_millis(100),
            ..config()
        };
        let host = TestHost::start(config, vec![question("Red planet?", 1, 30)]).await;
        let (mut ava, _) = host.join("Ava").await;
        let mut lurker = host.link().await;

        assert_eq!(timeout(WAIT, lurker.recv()).await.unwrap(), ClientEvent::Closed);

        // Joined players are not affected by the deadline
        tokio_test::assert_ok!(ava.send(&join_message("Ava")).await);
        assert!(matches!(
            expect_message(&mut ava).await,
            NetworkMessage::Welcome { .. }
        ));
    }
}

mod relay_tests {
    use super::*;
    use shared::ChatMessage;

    fn chat(text: &str) -> NetworkMessage {
        NetworkMessage::ChatMessage {
            message: ChatMessage {
                id: "msg-1".to_string(),
                sender_id: "forged".to_string(),
                sender_name: "Somebody Else".to_string(),
                sender_avatar: "🤖".to_string(),
                text: text.to_string(),
                timestamp: 1,
                is_host: true,
            },
        }
    }

    #[tokio::test]
    async fn chat_is_stamped_relayed_and_deleted() {
        let host = TestHost::start(config(), vec![question("Red planet?", 1, 30)]).await;
        let (mut ava, ava_id) = host.join("Ava").await;
        let (mut ben, _) = host.join("Ben").await;

        tokio_test::assert_ok!(ava.send(&chat("  hello room  ")).await);
        for link in [&mut ava, &mut ben] {
            match expect_message(link).await {
                NetworkMessage::ChatMessage { message } => {
                    assert_eq!(message.id, "msg-1");
                    assert_eq!(message.sender_id, ava_id);
                    assert_eq!(message.sender_name, "Ava");
                    assert_eq!(message.sender_avatar, "🦊");
                    assert_eq!(message.text, "hello room");
                    assert!(!message.is_host);
                }
                other => panic!("expected CHAT_MESSAGE, got {:?}", other),
            }
        }
        assert_eq!(host.snapshot().await.relay.chat_messages, 1);

        host.command(OperatorCommand::Delete("msg-1".to_string()));
        for link in [&mut ava, &mut ben] {
            assert_eq!(
                expect_message(link).await,
                NetworkMessage::DeleteChatMessage {
                    id: "msg-1".to_string()
                }
            );
        }
        assert_eq!(host.snapshot().await.relay.chat_messages, 0);

        host.command(OperatorCommand::Say("Welcome!".to_string()));
        match expect_message(&mut ben).await {
            NetworkMessage::ChatMessage { message } => {
                assert!(message.is_host);
                assert_eq!(message.text, "Welcome!");
            }
            other => panic!("expected CHAT_MESSAGE, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn reactions_skip_the_sender() {
        let host = TestHost::start(config(), vec![question("Red planet?", 1, 30)]).await;
        let (mut ava, ava_id) = host.join("Ava").await;
        let (mut ben, _) = host.join("Ben").await;

        let reaction = NetworkMessage::Reaction {
            emoji: "🔥".to_string(),
            sender_id: "forged".to_string(),
        };
        tokio_test::assert_ok!(ava.send(&reaction).await);

        assert_eq!(
            expect_message(&mut ben).await,
            NetworkMessage::Reaction {
                emoji: "🔥".to_string(),
                sender_id: ava_id,
            }
        );
        expect_silence(&mut ava).await;
    }

    #[tokio::test]
    async fn disabled_reactions_are_dropped() {
        let host = TestHost::start(config(), vec![question("Red planet?", 1, 30)]).await;
        let (mut ava, _) = host.join("Ava").await;
        let (mut ben, _) = host.join("Ben").await;

        host.command(OperatorCommand::Reactions(false));
        assert!(!host.snapshot().await.relay.reactions_allowed);

        let reaction = NetworkMessage::Reaction {
            emoji: "🎉".to_string(),
            sender_id: String::new(),
        };
        tokio_test::assert_ok!(ava.send(&reaction).await);
        expect_silence(&mut ben).await;
    }
}
