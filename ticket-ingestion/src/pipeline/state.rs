use state_machines::state_machine;

state_machine! {
    name: IngestionMachine,
    state: IngestionState,
    initial: Idle,
    states: [
        Idle, FetchingFields, FetchingTickets, Enriching, Chunking, Embedding, Upserting, Auditing, Done, Failed
    ],
    events {
        fetch_fields { transition: { from: Idle, to: FetchingFields } }
        fetch_tickets { transition: { from: FetchingFields, to: FetchingTickets } }
        enrich { transition: { from: FetchingTickets, to: Enriching } }
        chunk { transition: { from: Enriching, to: Chunking } }
        embed { transition: { from: Chunking, to: Embedding } }
        upsert { transition: { from: Embedding, to: Upserting } }
        audit { transition: { from: Upserting, to: Auditing } }
        finish { transition: { from: Auditing, to: Done } }
        abort {
            transition: { from: Idle, to: Failed }
            transition: { from: FetchingFields, to: Failed }
            transition: { from: FetchingTickets, to: Failed }
            transition: { from: Enriching, to: Failed }
            transition: { from: Chunking, to: Failed }
            transition: { from: Embedding, to: Failed }
            transition: { from: Upserting, to: Failed }
            transition: { from: Auditing, to: Failed }
        }
    }
}

pub fn idle() -> IngestionMachine<(), Idle> {
    IngestionMachine::new(())
}
