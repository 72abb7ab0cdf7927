pub mod seeding;
