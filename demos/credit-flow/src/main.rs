//! Two complete engine stacks wired back to back in memory: open,
//! attach, grant credit, move messages, acknowledge, close. Run with
//! `RUST_LOG=trace` to watch every frame cross the "wire".

use oxamq::prelude::*;
use rand::Rng;

const BUDGET: usize = 64 * 1024;

fn main() -> Result<(), OxamqError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let mut rng = rand::rng();
    let suffix: u32 = rng.random_range(0..0xffff);

    let mut producer = stack(&format!("producer-{suffix:04x}"))?;
    let mut consumer = stack(&format!("consumer-{suffix:04x}"))?;

    // Producer side: a session and a sender link.
    let conn = producer.connection_mut().expect("bound above");
    let session = conn.session();
    conn.session_mut(session)?.open();
    let sender = conn.sender(session, "credit-flow-demo")?;
    conn.link_mut(sender)?.open();

    // Consumer side: the matching receiver, with 3 credits granted.
    let conn = consumer.connection_mut().expect("bound above");
    let session = conn.session();
    conn.session_mut(session)?.open();
    let receiver = conn.receiver(session, "credit-flow-demo")?;
    conn.link_mut(receiver)?.open();
    conn.flow(receiver, 3)?;

    pump(&mut producer, &mut consumer)?;
    tracing::info!(
        credit = producer
            .connection()
            .expect("bound")
            .link_ref(sender)?
            .credit(),
        "sender credited"
    );

    // Send until the credit runs dry.
    let mut registry = TrackerRegistry::new();
    let mut sent = Vec::new();
    for n in 0.. {
        let conn = producer.connection_mut().expect("bound");
        let tag = format!("m-{n}");
        let delivery = conn.delivery(sender, tag.as_bytes())?;
        let message = Message::text(format!("message #{n}")).property("n", Value::Uint(n));
        match conn.send(sender, &message.encode()?) {
            Ok(_) => {}
            Err(oxamq::engine::EngineError::InsufficientCredit) => {
                tracing::info!(sent = sent.len(), "credit exhausted, stopping");
                break;
            }
            Err(e) => return Err(e.into()),
        }
        conn.advance(sender)?;
        sent.push(registry.track(delivery));
    }

    pump(&mut producer, &mut consumer)?;

    // Consume in arrival order, acknowledge cumulatively.
    let conn = consumer.connection_mut().expect("bound");
    while conn.work_pop().is_some() {}
    let mut ack = TrackerRegistry::new();
    let mut last = None;
    while let Some(delivery) = conn.current(receiver)? {
        let bytes = conn.recv(receiver, BUDGET)?.expect("completed delivery");
        let message = Message::decode(&bytes)?;
        tracing::info!(body = ?message.body, "received");
        last = Some(ack.track(delivery));
        conn.advance(receiver)?;
    }
    if let Some(last) = last {
        ack.accept(conn, last, true)?;
        ack.settle(conn, last, true)?;
    }

    pump(&mut producer, &mut consumer)?;

    // The producer observes the outcomes and settles.
    let conn = producer.connection_mut().expect("bound");
    for &tracker in &sent {
        if let Some(delivery) = registry.delivery(tracker) {
            tracing::info!(
                %tracker,
                state = ?conn.delivery_ref(delivery)?.remote_state(),
                "outcome"
            );
        }
    }
    if let Some(&last) = sent.last() {
        registry.settle(conn, last, true)?;
    }

    // Orderly shutdown both ways.
    producer.connection_mut().expect("bound").close();
    consumer.connection_mut().expect("bound").close();
    pump(&mut producer, &mut consumer)?;
    tracing::info!(
        frames_out = producer.frames_output(),
        frames_in = producer.frames_input(),
        "done"
    );
    Ok(())
}

fn stack(container: &str) -> Result<Transport, OxamqError> {
    let mut transport = Transport::new();
    let mut connection = Connection::new(container);
    connection.open();
    transport.bind(connection)?;
    Ok(transport)
}

fn pump(a: &mut Transport, b: &mut Transport) -> Result<(), OxamqError> {
    loop {
        let mut moved = false;
        if let Some(bytes) = a.output(BUDGET)? {
            if !bytes.is_empty() {
                b.input(&bytes)?;
                moved = true;
            }
        }
        if let Some(bytes) = b.output(BUDGET)? {
            if !bytes.is_empty() {
                a.input(&bytes)?;
                moved = true;
            }
        }
        if !moved {
            return Ok(());
        }
    }
}
