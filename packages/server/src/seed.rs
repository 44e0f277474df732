//! Development seed data: three sample rooms, a handful of players with
//! memberships in room 1, the question bank, and the language table.

use tracing::info;

use common::language::Language;
use common::models::{Player, Question, Room, RoomMembership};

use crate::repository::MemoryRepository;
use crate::utils::hash;

pub fn seed_dev_data(repo: &MemoryRepository) {
    for room in [
        (1, "Nerd's room", "We welcome nerds"),
        (2, "FPTU Hackathon", "Coding round 2 for FPTU Hackathon"),
        (3, "Late Night Grind", "Practice rounds after midnight"),
    ] {
        repo.insert_room(Room {
            id: room.0,
            name: room.1.to_string(),
            description: room.2.to_string(),
        });
    }

    for (id, name) in [(1, "Alice"), (2, "Bob"), (3, "Charlie"), (4, "David"), (5, "Phuc")] {
        repo.insert_player(Player {
            id,
            name: name.to_string(),
            password_hash: hash::hash_password("password"),
        });
    }

    for (player_id, score, place) in [(1, 100, 1), (2, 80, 2), (3, 60, 3), (4, 50, 4), (5, 20, 5)] {
        repo.insert_membership(RoomMembership {
            room_id: 1,
            player_id,
            score,
            place,
        });
    }

    for (id, title, description, score, difficulty) in [
        (1, "Two Sum", "Find two numbers that add up to a target", 50, 1),
        (2, "Anagram", "Check if two strings are anagrams", 50, 1),
        (
            3,
            "Reverse Binary Tree",
            "Reverse the order of nodes in a binary tree",
            50,
            2,
        ),
        (
            4,
            "Best time to buy and sell stock",
            "Buy at the lowest price and sell at the highest price",
            50,
            2,
        ),
        (
            5,
            "Second largest element in an array",
            "Second largest element in an array",
            50,
            3,
        ),
    ] {
        repo.insert_question(Question {
            id,
            title: title.to_string(),
            description: description.to_string(),
            score,
            difficulty,
        });
    }

    for (id, name, source_file, run_cmd) in [
        (1, "Python", "main.py", "python3 -c '%s'"),
        (2, "Javascript", "main.js", "node -e '%s'"),
        (
            3,
            "Golang",
            "main.go",
            "echo '%s' > /tmp/main.go && go run /tmp/main.go",
        ),
    ] {
        repo.insert_language(Language {
            id,
            name: name.to_string(),
            source_file: source_file.to_string(),
            compile_cmd: None,
            run_cmd: run_cmd.to_string(),
            is_project: false,
        });
    }

    info!("seeded development data");
}
